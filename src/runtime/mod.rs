mod channel;
mod context;
mod executor;

pub use channel::{Channel, ChannelOptions};
pub use context::Context;
pub use executor::{Executor, ExecutorParts};

#[cfg(test)]
pub(crate) use executor::testing as executor_testing;
