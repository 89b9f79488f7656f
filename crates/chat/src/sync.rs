use plotline_stream::StreamSession;

use crate::message::Conversation;

/// Copies a stream snapshot into the conversation's pending exchange.
///
/// Answer text and chart specs land on the most recent assistant message;
/// suggestions replace the conversation-level list. Safe to call on every
/// snapshot: the copy is wholesale, so replaying the same snapshot twice is
/// a no-op.
pub fn merge_snapshot(conversation: &mut Conversation, snapshot: &StreamSession) {
    if let Some(message) = conversation.last_assistant_mut() {
        message.text = snapshot.answer().to_string();
        message.chart_specs = snapshot.chart_specs().map(<[_]>::to_vec);
    } else {
        tracing::warn!(
            conversation = %conversation.id,
            "stream snapshot arrived with no assistant message to merge into"
        );
    }

    conversation.suggestions = snapshot.suggestions().to_vec();
}
