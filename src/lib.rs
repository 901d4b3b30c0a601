pub mod bet;
pub mod captcha;
pub mod client;
pub mod config;
pub mod detector;
pub mod error;
pub mod farm;
pub mod gems;
pub mod huntbot;
pub mod message;
pub mod normalize;
pub mod quests;
pub mod schedule;
pub mod session;
pub mod timing;

pub use bet::*;
pub use captcha::*;
pub use client::*;
pub use config::*;
pub use error::*;
pub use farm::*;
pub use message::*;
pub use schedule::*;
pub use session::*;
