pub mod game;
pub mod lobby;
pub mod player;
pub mod protocol;
pub mod settings;
pub mod vote;
pub mod words;
