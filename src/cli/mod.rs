pub mod screen;
pub mod search;
pub mod selection;
pub mod setup;
pub mod ui;
