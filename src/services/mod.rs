pub mod cache;
pub mod events;
pub mod recommendation;
pub mod stores;
pub mod training;
