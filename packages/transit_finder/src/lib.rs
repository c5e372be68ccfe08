pub mod common;
pub mod loading;
pub mod routing;
