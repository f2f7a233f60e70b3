pub mod news;
pub mod research;
