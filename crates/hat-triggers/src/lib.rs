//! Message-reaction engine: cooldowns, lookback scanning, trigger evaluators
//! and the dispatcher that fans inbound messages out to them.

pub mod cooldown;
pub mod dispatch;
pub mod keywords;
pub mod lookback;
pub mod reply;
pub mod runtime;
pub mod triggers;

#[cfg(test)]
pub(crate) mod test_support;

pub use cooldown::CooldownTracker;
pub use dispatch::{
    gateway_queue, run_dispatch_forwarder, GatewayQueue, GatewaySender, MessageDispatcher,
    MessageFilter, MessageInbox,
};
pub use keywords::KeywordSet;
pub use lookback::{format_echo, is_repeat_candidate, LookbackScanner, LOOKBACK_WINDOW};
pub use reply::{send_with_typing_delay, Reply, ReplyDelay};
pub use runtime::TriggerRuntime;
pub use triggers::{
    echo::{EchoTrigger, EchoTriggerConfig},
    keyword_image::{KeywordImageConfig, KeywordImageTrigger},
    mention::{MentionTrigger, MentionTriggerConfig},
    run_trigger, Trigger, TriggerRunReport,
};
