pub mod catalog;
pub mod events;
pub mod image;
pub mod session;
pub mod settings;
pub mod transcript;
pub mod wizard;
