pub mod config;
pub mod event;
pub mod game;
pub mod night;
pub mod player;
pub mod role;
pub mod room;
pub mod vote;
