pub mod address;
pub mod callback;
pub mod ids;
pub mod message;
