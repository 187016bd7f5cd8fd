pub mod calling;
pub mod cli;
pub mod commands;
pub mod model;
pub mod reads;
pub mod realign;
pub mod utils;
pub mod writers;
