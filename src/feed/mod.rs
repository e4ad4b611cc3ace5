pub mod random_walk;
pub mod replay;
pub mod traits;

pub use random_walk::RandomWalkFeed;
pub use replay::ReplayFeed;
pub use traits::MarketFeed;

#[cfg(test)]
mod feed_tests;
