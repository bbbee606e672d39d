pub mod catalog;
pub mod top_items;
