use std::collections::{HashMap, HashSet};

use uuid::Uuid;

use schoolhub_types::models::{Conversation, Message, Profile};

/// Display name used until the counterparty's profile is resolved.
pub const UNKNOWN_PEER: &str = "Unknown user";

/// The other participant of `message` from `viewer`'s side.
/// A message to oneself has the viewer as counterparty.
pub fn counterparty(viewer: Uuid, message: &Message) -> Uuid {
    if message.sender_id == viewer {
        message.recipient_id
    } else {
        message.sender_id
    }
}

/// Collapse a newest-first message list into one conversation per
/// counterparty, in order of first appearance. The first message seen for a
/// counterparty is kept; later ones are ignored.
pub fn build_conversations(viewer: Uuid, messages: &[Message]) -> Vec<Conversation> {
    let mut seen = HashSet::new();
    let mut conversations = Vec::new();

    for message in messages {
        let peer_id = counterparty(viewer, message);
        if !seen.insert(peer_id) {
            continue;
        }
        conversations.push(Conversation {
            peer_id,
            peer_name: UNKNOWN_PEER.to_string(),
            peer_role: None,
            last_message: message.clone(),
        });
    }

    conversations
}

/// Counterparty ids in conversation order, for the batched profile lookup.
pub fn peer_ids(conversations: &[Conversation]) -> Vec<Uuid> {
    conversations.iter().map(|c| c.peer_id).collect()
}

/// Fill in names and roles from `profiles`; peers without one keep the placeholder.
pub fn attach_profiles(conversations: &mut [Conversation], profiles: &[Profile]) {
    let by_id: HashMap<Uuid, &Profile> = profiles.iter().map(|p| (p.id, p)).collect();
    for conversation in conversations {
        if let Some(profile) = by_id.get(&conversation.peer_id) {
            conversation.peer_name = profile.full_name.clone();
            conversation.peer_role = Some(profile.role);
        }
    }
}
