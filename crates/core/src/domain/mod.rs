pub mod candidate;
pub mod contact;
pub mod decision;
