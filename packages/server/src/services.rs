pub mod audit;
pub mod clock;
pub mod game_service;
pub mod night_resolver;
pub mod phase_controller;
pub mod role_distribution;
pub mod room_service;
pub mod session_actor;
pub mod vote_service;
pub mod win_evaluator;
