//! Short opaque id generation for staged proposals.

use rand::Rng;

use crate::traits::IdGenerator;

/// 12 hex characters of randomness — collision-free for the minutes a
/// proposal lives in the staging store.
#[derive(Debug, Default, Clone, Copy)]
pub struct HexIdGenerator;

impl IdGenerator for HexIdGenerator {
    fn generate(&self) -> String {
        let n: u64 = rand::thread_rng().gen();
        format!("{:012x}", n & 0xffff_ffff_ffff)
    }
}
