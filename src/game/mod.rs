pub mod appearance;
pub mod commands;
pub mod constants;
pub mod interfaces;
pub mod lifecycle;
pub mod player;
pub mod player_info;
pub mod position;
pub mod region_keys;
pub mod world;
