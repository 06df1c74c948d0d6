pub mod generic;
pub mod platforms;
