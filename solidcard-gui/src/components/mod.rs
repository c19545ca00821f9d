pub mod profile_form;
pub mod sign_in;
