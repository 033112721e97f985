pub mod brick;
pub mod dice;
pub mod minigame;

pub use brick::BrickGame;
pub use dice::DiceGame;
pub use minigame::{MiniGame, MiniGameConfig};
