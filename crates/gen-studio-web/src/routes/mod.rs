// Route handler modules

pub mod generate;
pub mod health;
pub mod models;
pub mod videos;
