pub mod events;
pub mod output;
pub mod play;
pub mod proxies;
