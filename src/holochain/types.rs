//! Records, actions and signals observed by the stores

use serde::{Deserialize, Serialize};

use super::hash::{ActionHash, AgentPubKey, AnyDhtHash, AnyLinkableHash, EntryHash};

/// Microseconds since the UNIX epoch
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Timestamp(pub i64);

impl Timestamp {
    pub fn from_millis(millis: i64) -> Self {
        Self(millis * 1000)
    }

    pub fn as_micros(self) -> i64 {
        self.0
    }

    /// Whole milliseconds, rounded down
    pub fn as_millis(self) -> i64 {
        self.0.div_euclid(1000)
    }

    pub fn now() -> Self {
        let micros = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_micros() as i64)
            .unwrap_or_default();
        Self(micros)
    }
}

/// Fields shared by every action
pub trait ActionContent {
    fn author(&self) -> &AgentPubKey;
    fn timestamp(&self) -> Timestamp;
}

macro_rules! action_content {
    ($($action:ty),* $(,)?) => {
        $(
            impl ActionContent for $action {
                fn author(&self) -> &AgentPubKey {
                    &self.author
                }

                fn timestamp(&self) -> Timestamp {
                    self.timestamp
                }
            }
        )*
    };
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Create {
    pub author: AgentPubKey,
    pub timestamp: Timestamp,
    pub action_seq: u32,
    pub prev_action: ActionHash,
    pub entry_hash: EntryHash,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Update {
    pub author: AgentPubKey,
    pub timestamp: Timestamp,
    pub action_seq: u32,
    pub prev_action: ActionHash,
    pub original_action_address: ActionHash,
    pub original_entry_address: EntryHash,
    pub entry_hash: EntryHash,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delete {
    pub author: AgentPubKey,
    pub timestamp: Timestamp,
    pub action_seq: u32,
    pub prev_action: ActionHash,
    pub deletes_address: ActionHash,
    pub deletes_entry_address: EntryHash,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateLink {
    pub author: AgentPubKey,
    pub timestamp: Timestamp,
    pub action_seq: u32,
    pub prev_action: ActionHash,
    pub base_address: AnyLinkableHash,
    pub target_address: AnyLinkableHash,
    pub zome_index: u8,
    pub link_type: u8,
    #[serde(default)]
    pub tag: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteLink {
    pub author: AgentPubKey,
    pub timestamp: Timestamp,
    pub action_seq: u32,
    pub prev_action: ActionHash,
    pub base_address: AnyLinkableHash,
    pub link_add_address: ActionHash,
}

action_content!(Create, Update, Delete, CreateLink, DeleteLink);

/// The action that wrote an entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum EntryAction {
    Create(Create),
    Update(Update),
}

impl EntryAction {
    pub fn entry_hash(&self) -> &EntryHash {
        match self {
            EntryAction::Create(create) => &create.entry_hash,
            EntryAction::Update(update) => &update.entry_hash,
        }
    }
}

impl ActionContent for EntryAction {
    fn author(&self) -> &AgentPubKey {
        match self {
            EntryAction::Create(create) => create.author(),
            EntryAction::Update(update) => update.author(),
        }
    }

    fn timestamp(&self) -> Timestamp {
        match self {
            EntryAction::Create(create) => create.timestamp,
            EntryAction::Update(update) => update.timestamp,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionHashed<A> {
    pub hash: ActionHash,
    pub content: A,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedActionHashed<A> {
    pub hashed: ActionHashed<A>,
    #[serde(default)]
    pub signature: Vec<u8>,
}

impl<A> SignedActionHashed<A> {
    pub fn hash(&self) -> &ActionHash {
        &self.hashed.hash
    }

    pub fn content(&self) -> &A {
        &self.hashed.content
    }

    /// Same hash and signature over a converted action
    pub fn map_content<B>(self, f: impl FnOnce(A) -> B) -> SignedActionHashed<B> {
        SignedActionHashed {
            hashed: ActionHashed {
                hash: self.hashed.hash,
                content: f(self.hashed.content),
            },
            signature: self.signature,
        }
    }
}

impl<A: ActionContent> SignedActionHashed<A> {
    pub fn timestamp(&self) -> Timestamp {
        self.hashed.content.timestamp()
    }
}

/// A live link, identified by the hash of the action that created it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub author: AgentPubKey,
    pub base: AnyLinkableHash,
    pub target: AnyLinkableHash,
    pub timestamp: Timestamp,
    pub zome_index: u8,
    pub link_type: u8,
    #[serde(default)]
    pub tag: Vec<u8>,
    pub create_link_hash: ActionHash,
}

/// The link a create-link action produced
pub fn create_link_to_link(create_link: &SignedActionHashed<CreateLink>) -> Link {
    let content = create_link.content();
    Link {
        author: content.author.clone(),
        base: content.base_address.clone(),
        target: content.target_address.clone(),
        timestamp: content.timestamp,
        zome_index: content.zome_index,
        link_type: content.link_type,
        tag: content.tag.clone(),
        create_link_hash: create_link.hash().clone(),
    }
}

impl From<&SignedActionHashed<CreateLink>> for Link {
    fn from(create_link: &SignedActionHashed<CreateLink>) -> Self {
        create_link_to_link(create_link)
    }
}

/// A deleted link: its create action and every delete action targeting it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletedLink {
    pub create_link: SignedActionHashed<CreateLink>,
    pub deletes: Vec<SignedActionHashed<DeleteLink>>,
}

impl DeletedLink {
    pub fn new(
        create_link: SignedActionHashed<CreateLink>,
        deletes: Vec<SignedActionHashed<DeleteLink>>,
    ) -> Self {
        Self {
            create_link,
            deletes,
        }
    }

    pub fn create_link_hash(&self) -> &ActionHash {
        self.create_link.hash()
    }
}

/// An application entry together with the action that wrote it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryRecord<T> {
    pub signed_action: SignedActionHashed<EntryAction>,
    pub entry: T,
}

impl<T> EntryRecord<T> {
    pub fn new(signed_action: SignedActionHashed<EntryAction>, entry: T) -> Self {
        Self {
            signed_action,
            entry,
        }
    }

    /// Identity of this revision
    pub fn action_hash(&self) -> &ActionHash {
        self.signed_action.hash()
    }

    pub fn entry_hash(&self) -> &EntryHash {
        self.signed_action.content().entry_hash()
    }

    pub fn action(&self) -> &EntryAction {
        self.signed_action.content()
    }

    pub fn entry(&self) -> &T {
        &self.entry
    }

    pub fn timestamp(&self) -> Timestamp {
        self.signed_action.timestamp()
    }

    /// Action timestamp in milliseconds
    pub fn timestamp_millis(&self) -> i64 {
        self.timestamp().as_millis()
    }
}

/// Signal emitted by a coordinator zome after committing an action
///
/// `E` is the zome's entry type enum, `L` its link type enum.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ActionCommittedSignal<E, L> {
    EntryCreated {
        action: SignedActionHashed<Create>,
        app_entry: E,
    },
    EntryUpdated {
        action: SignedActionHashed<Update>,
        app_entry: E,
        original_app_entry: E,
    },
    EntryDeleted {
        action: SignedActionHashed<Delete>,
        original_app_entry: E,
    },
    LinkCreated {
        action: SignedActionHashed<CreateLink>,
        link_type: L,
    },
    LinkDeleted {
        action: SignedActionHashed<DeleteLink>,
        create_link_action: SignedActionHashed<CreateLink>,
        link_type: L,
    },
}

impl<E, L> ActionCommittedSignal<E, L> {
    /// The tag this signal is serialized with
    pub fn kind(&self) -> &'static str {
        match self {
            ActionCommittedSignal::EntryCreated { .. } => "EntryCreated",
            ActionCommittedSignal::EntryUpdated { .. } => "EntryUpdated",
            ActionCommittedSignal::EntryDeleted { .. } => "EntryDeleted",
            ActionCommittedSignal::LinkCreated { .. } => "LinkCreated",
            ActionCommittedSignal::LinkDeleted { .. } => "LinkDeleted",
        }
    }

    /// Hash of the committed action
    pub fn action_hash(&self) -> &AnyDhtHash {
        match self {
            ActionCommittedSignal::EntryCreated { action, .. } => action.hash(),
            ActionCommittedSignal::EntryUpdated { action, .. } => action.hash(),
            ActionCommittedSignal::EntryDeleted { action, .. } => action.hash(),
            ActionCommittedSignal::LinkCreated { action, .. } => action.hash(),
            ActionCommittedSignal::LinkDeleted { action, .. } => action.hash(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::holochain::hash::{HashType, HoloHash};
    use serde_json::json;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    #[serde(tag = "type")]
    enum EntryTypes {
        Post { title: String },
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    enum LinkTypes {
        AllPosts,
    }

    fn hash(t: HashType, byte: u8) -> HoloHash {
        HoloHash::from_parts(t, [byte; 32], [0; 4])
    }

    #[test]
    fn test_timestamp_millis_rounds_down() {
        assert_eq!(Timestamp(1_999).as_millis(), 1);
        assert_eq!(Timestamp(-1).as_millis(), -1);
        assert_eq!(Timestamp::from_millis(5).as_micros(), 5_000);
    }

    #[test]
    fn test_decode_link_created_signal() {
        let action_hash = hash(HashType::Action, 1);
        let base = hash(HashType::Entry, 2);
        let target = hash(HashType::Action, 3);
        let author = hash(HashType::Agent, 4);

        let raw = json!({
            "type": "LinkCreated",
            "link_type": "AllPosts",
            "action": {
                "hashed": {
                    "hash": action_hash.as_bytes(),
                    "content": {
                        "author": author.as_bytes(),
                        "timestamp": 1_700_000_000_000_000i64,
                        "action_seq": 7,
                        "prev_action": action_hash.as_bytes(),
                        "base_address": base.as_bytes(),
                        "target_address": target.as_bytes(),
                        "zome_index": 0,
                        "link_type": 0,
                        "tag": []
                    }
                },
                "signature": []
            }
        });

        let signal: ActionCommittedSignal<EntryTypes, LinkTypes> =
            serde_json::from_value(raw).unwrap();
        assert_eq!(signal.kind(), "LinkCreated");
        assert_eq!(signal.action_hash(), &action_hash);

        let ActionCommittedSignal::LinkCreated { action, link_type } = signal else {
            panic!("expected LinkCreated");
        };
        assert_eq!(link_type, LinkTypes::AllPosts);

        let link = create_link_to_link(&action);
        assert_eq!(link.base, base);
        assert_eq!(link.target, target);
        assert_eq!(link.create_link_hash, action_hash);
        assert_eq!(link.timestamp.as_millis(), 1_700_000_000_000);
    }

    #[test]
    fn test_unknown_signal_type_is_rejected() {
        let raw = json!({ "type": "SomethingElse", "payload": 1 });
        let decoded: Result<ActionCommittedSignal<EntryTypes, LinkTypes>, _> =
            serde_json::from_value(raw);
        assert!(decoded.is_err());
    }
}
