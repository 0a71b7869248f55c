mod channel;
mod sink;

pub use channel::OutputChannel;
pub use sink::{render_listing, render_pretty, OutputSink};
