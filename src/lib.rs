pub mod answer;
pub mod dom;
pub mod input_locator;
pub mod protocol;
pub mod questions;
pub mod selector;
pub mod settings;
pub mod target;
pub mod text_locator;
pub mod text_repair;
pub mod trace;
pub mod typing;
