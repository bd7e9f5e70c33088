mod game;

pub use game::run;
