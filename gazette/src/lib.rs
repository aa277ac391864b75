pub mod controller;
pub mod newsroom;

pub use controller::Gazette;
pub use newsroom::{Newsroom, NewsroomError, Publication};
