use tracing::warn;

use cortex_core::event::{Event, Publish};
use cortex_core::state::SharedState;

/// Sender name recorded for replies in the conversation log.
pub const ASSISTANT_SENDER: &str = "assistant";

/// How a node's `reply` text reaches the user.
///
/// Chosen when the executor is built; policies compose by wrapping.
pub trait ReplyPolicy: Send + Sync {
    fn deliver(&self, state: &SharedState, reply: &str, publisher: &dyn Publish);
}

/// Publish the reply as an `assistant` event.
#[derive(Debug, Clone, Copy, Default)]
pub struct BroadcastReply;

impl ReplyPolicy for BroadcastReply {
    fn deliver(&self, _state: &SharedState, reply: &str, publisher: &dyn Publish) {
        publisher.publish(Event::assistant(reply));
    }
}

/// Append the reply to the attached conversation log, then hand it to the
/// inner policy. Without an attached log this is just the inner policy.
#[derive(Debug, Clone, Copy, Default)]
pub struct RecordReply<P = BroadcastReply>(pub P);

impl<P: ReplyPolicy> ReplyPolicy for RecordReply<P> {
    fn deliver(&self, state: &SharedState, reply: &str, publisher: &dyn Publish) {
        if let Some(log) = state.conversation_log() {
            if let Err(e) = log.append(ASSISTANT_SENDER, reply) {
                warn!(error = %e, "Failed to record assistant reply");
            }
        }
        self.0.deliver(state, reply, publisher);
    }
}

/// The default policy: record, then broadcast.
pub type ConversationReplies = RecordReply<BroadcastReply>;
