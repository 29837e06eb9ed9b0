//! Fake hashes, actions and records for tests and demos
//!
//! Hashes carry the right type prefix with random content, so values built
//! here never collide with each other.

use rand::RngCore;

use super::hash::{ActionHash, AgentPubKey, DnaHash, EntryHash, HashType, HoloHash};
use super::types::{
    ActionHashed, Create, CreateLink, Delete, DeleteLink, EntryAction, EntryRecord, Link,
    SignedActionHashed, Timestamp, Update,
};

fn fake_hash(hash_type: HashType) -> HoloHash {
    let mut rng = rand::thread_rng();
    let mut core = [0u8; 32];
    let mut location = [0u8; 4];
    rng.fill_bytes(&mut core);
    rng.fill_bytes(&mut location);
    HoloHash::from_parts(hash_type, core, location)
}

pub fn fake_agent_pub_key() -> AgentPubKey {
    fake_hash(HashType::Agent)
}

pub fn fake_entry_hash() -> EntryHash {
    fake_hash(HashType::Entry)
}

pub fn fake_action_hash() -> ActionHash {
    fake_hash(HashType::Action)
}

pub fn fake_dna_hash() -> DnaHash {
    fake_hash(HashType::Dna)
}

fn fake_signature() -> Vec<u8> {
    let mut signature = vec![0u8; 64];
    rand::thread_rng().fill_bytes(&mut signature);
    signature
}

/// Sign and hash `content` with a fresh action hash
pub fn fake_signed<A>(content: A) -> SignedActionHashed<A> {
    SignedActionHashed {
        hashed: ActionHashed {
            hash: fake_action_hash(),
            content,
        },
        signature: fake_signature(),
    }
}

pub fn fake_create(timestamp: Timestamp) -> SignedActionHashed<Create> {
    fake_signed(Create {
        author: fake_agent_pub_key(),
        timestamp,
        action_seq: 10,
        prev_action: fake_action_hash(),
        entry_hash: fake_entry_hash(),
    })
}

/// An update of `original`
pub fn fake_update(original: &ActionHash, timestamp: Timestamp) -> SignedActionHashed<Update> {
    fake_signed(Update {
        author: fake_agent_pub_key(),
        timestamp,
        action_seq: 10,
        prev_action: fake_action_hash(),
        original_action_address: original.clone(),
        original_entry_address: fake_entry_hash(),
        entry_hash: fake_entry_hash(),
    })
}

/// A delete of `deletes_address`
pub fn fake_delete(
    deletes_address: &ActionHash,
    timestamp: Timestamp,
) -> SignedActionHashed<Delete> {
    fake_signed(Delete {
        author: fake_agent_pub_key(),
        timestamp,
        action_seq: 10,
        prev_action: fake_action_hash(),
        deletes_address: deletes_address.clone(),
        deletes_entry_address: fake_entry_hash(),
    })
}

/// A create-link from `base` to a random target
pub fn fake_create_link_from(
    base: &HoloHash,
    link_type: u8,
    timestamp: Timestamp,
) -> SignedActionHashed<CreateLink> {
    fake_signed(CreateLink {
        author: fake_agent_pub_key(),
        timestamp,
        action_seq: 10,
        prev_action: fake_action_hash(),
        base_address: base.clone(),
        target_address: fake_action_hash(),
        zome_index: 0,
        link_type,
        tag: Vec::new(),
    })
}

pub fn fake_create_link(timestamp: Timestamp) -> SignedActionHashed<CreateLink> {
    fake_create_link_from(&fake_entry_hash(), 0, timestamp)
}

/// A delete of the link created by `create_link`
pub fn fake_delete_link(
    create_link: &SignedActionHashed<CreateLink>,
    timestamp: Timestamp,
) -> SignedActionHashed<DeleteLink> {
    fake_signed(DeleteLink {
        author: fake_agent_pub_key(),
        timestamp,
        action_seq: 10,
        prev_action: fake_action_hash(),
        base_address: create_link.content().base_address.clone(),
        link_add_address: create_link.hash().clone(),
    })
}

pub fn fake_link(timestamp: Timestamp) -> Link {
    Link::from(&fake_create_link(timestamp))
}

/// A record created at `timestamp` holding `entry`
pub fn fake_record<T>(entry: T, timestamp: Timestamp) -> EntryRecord<T> {
    EntryRecord::new(fake_create(timestamp).map_content(EntryAction::Create), entry)
}

/// A record holding `entry` that updates `original`
pub fn fake_update_record<T>(
    entry: T,
    original: &ActionHash,
    timestamp: Timestamp,
) -> EntryRecord<T> {
    EntryRecord::new(
        fake_update(original, timestamp).map_content(EntryAction::Update),
        entry,
    )
}
