pub mod adverse_movement;
pub mod profit_target;
pub mod time_based;
pub mod trailing_stop;
