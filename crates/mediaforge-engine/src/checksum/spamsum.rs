//! SpamSum context-triggered piecewise hashing
//!
//! Streaming implementation: 31 block-size states run in parallel so the
//! input is never buffered, and the final block size is chosen from the
//! total length at finalize time. Output is the usual
//! `blocksize:hash:hash` signature.

const ROLLING_WINDOW: usize = 7;
const MIN_BLOCKSIZE: u64 = 3;
const SPAMSUM_LENGTH: usize = 64;
const HALF_LENGTH: usize = SPAMSUM_LENGTH / 2;
const NUM_BLOCKHASHES: usize = 31;
const HASH_INIT: u32 = 0x2802_1967;
const HASH_PRIME: u32 = 0x0100_0193;
const BASE64: &[u8; 64] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";

fn sum_hash(c: u8, h: u32) -> u32 {
    h.wrapping_mul(HASH_PRIME) ^ c as u32
}

#[derive(Debug, Clone)]
struct RollingState {
    window: [u8; ROLLING_WINDOW],
    h1: u32,
    h2: u32,
    h3: u32,
    n: usize,
}

impl RollingState {
    fn new() -> Self {
        Self { window: [0; ROLLING_WINDOW], h1: 0, h2: 0, h3: 0, n: 0 }
    }

    fn hash(&self) -> u32 {
        self.h1.wrapping_add(self.h2).wrapping_add(self.h3)
    }

    fn roll(&mut self, c: u8) {
        self.h2 = self.h2.wrapping_sub(self.h1);
        self.h2 = self
            .h2
            .wrapping_add((ROLLING_WINDOW as u32).wrapping_mul(c as u32));
        self.h1 = self.h1.wrapping_add(c as u32);
        self.h1 = self.h1.wrapping_sub(self.window[self.n % ROLLING_WINDOW] as u32);
        self.window[self.n % ROLLING_WINDOW] = c;
        self.n += 1;
        self.h3 = (self.h3 << 5) ^ c as u32;
    }
}

#[derive(Debug, Clone)]
struct BlockHash {
    h: u32,
    halfh: u32,
    digest: Vec<u8>,
    halfdigest: Option<u8>,
}

impl BlockHash {
    fn new() -> Self {
        Self { h: HASH_INIT, halfh: HASH_INIT, digest: Vec::new(), halfdigest: None }
    }
}

/// SpamSum running context
#[derive(Debug, Clone)]
pub struct SpamSum {
    bh: Vec<BlockHash>,
    roll: RollingState,
    total_size: u64,
}

impl SpamSum {
    pub fn new() -> Self {
        Self {
            bh: (0..NUM_BLOCKHASHES).map(|_| BlockHash::new()).collect(),
            roll: RollingState::new(),
            total_size: 0,
        }
    }

    pub fn update(&mut self, data: &[u8]) {
        for &c in data {
            for bh in &mut self.bh {
                bh.h = sum_hash(c, bh.h);
                bh.halfh = sum_hash(c, bh.halfh);
            }

            self.roll.roll(c);
            let h = self.roll.hash() as u64;

            for i in 0..NUM_BLOCKHASHES {
                let blocksize = MIN_BLOCKSIZE << i;
                // Triggers nest: a miss at this block size rules out the rest
                if h % blocksize != blocksize - 1 {
                    break;
                }
                let bh = &mut self.bh[i];
                if bh.digest.len() < SPAMSUM_LENGTH - 1 {
                    bh.digest.push(BASE64[(bh.h % 64) as usize]);
                    bh.h = HASH_INIT;
                    if bh.digest.len() < HALF_LENGTH {
                        bh.halfh = HASH_INIT;
                        bh.halfdigest = None;
                    }
                }
                if bh.digest.len() == HALF_LENGTH {
                    bh.halfdigest = Some(BASE64[(bh.halfh % 64) as usize]);
                    bh.halfh = HASH_INIT;
                }
            }
        }
        self.total_size += data.len() as u64;
    }

    pub fn finalize(self) -> String {
        let mut bi = 0usize;
        while bi < NUM_BLOCKHASHES - 1
            && (MIN_BLOCKSIZE << bi) * (SPAMSUM_LENGTH as u64) < self.total_size
        {
            bi += 1;
        }
        while bi > 0 && self.bh[bi].digest.len() < HALF_LENGTH {
            bi -= 1;
        }

        let h = self.roll.hash();
        let chosen = &self.bh[bi];

        let mut signature = format!("{}:", MIN_BLOCKSIZE << bi);
        signature.push_str(std::str::from_utf8(&chosen.digest).unwrap_or(""));
        if h != 0 {
            signature.push(BASE64[(chosen.h % 64) as usize] as char);
        }
        signature.push(':');

        if bi + 1 < NUM_BLOCKHASHES {
            let next = &self.bh[bi + 1];
            let take = next.digest.len().min(HALF_LENGTH - 1);
            signature.push_str(std::str::from_utf8(&next.digest[..take]).unwrap_or(""));
            if h != 0 {
                signature.push(BASE64[(next.halfh % 64) as usize] as char);
            } else if let Some(halfdigest) = next.halfdigest {
                signature.push(halfdigest as char);
            }
        } else if h != 0 {
            signature.push(BASE64[(chosen.h % 64) as usize] as char);
        }

        signature
    }
}

impl Default for SpamSum {
    fn default() -> Self {
        Self::new()
    }
}
