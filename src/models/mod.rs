pub mod assignment;
pub mod batch;
pub mod campaign;
pub mod capacity;
pub mod courier;
pub mod item;
pub mod notification;
pub mod order;
pub mod verification;
