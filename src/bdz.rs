use crate::MphError;
use crate::bits::{BitBuffer, bit_width};
use crate::hash::{UniversalHash, mix_salt, scale, splitmix64};

/// Fallback minimal perfect hash by BDZ (3-hypergraph peeling) for the keys
/// of buckets that exceed their fill or bit budget:
/// - one universal hash per key + splitmix64 for the three vertices
/// - vertices live in three disjoint segments, so no edge is degenerate
/// - CSR adjacency (offsets + flat edges)
/// - 2-bit g values; `(g[v0] + g[v1] + g[v2]) % 3` picks the key's vertex
/// - rank over assigned vertices (g != 3) makes the result minimal
///
/// Query: f(k) = rank(v[(g[v0] + g[v1] + g[v2]) % 3])
///
/// Stream layout:
///
/// ```text
/// EliasDelta(n + 1)
/// -- only when n > 0 --
/// hash index      64 bits
/// EliasDelta(segment + 1)
/// g               3 * segment values of 2 bits
/// rank samples    ceil(3 * segment / RANK_BLOCK) values of bit_width(n) bits
/// ```
#[derive(Debug, Clone)]
pub struct BdzConfig {
    /// Vertex ratio m/n; BDZ classic ~1.23.
    pub gamma: f64,
    /// Rehash attempts per segment size. Once exhausted, the segment grows.
    pub rehash_limit: u32,
    /// Base salt. Hash indices are derived deterministically.
    pub salt: u64,
}

impl Default for BdzConfig {
    fn default() -> Self {
        Self {
            gamma: 1.27,
            rehash_limit: 16,
            salt: 0xC0FF_EE00_D15E_A5E,
        }
    }
}

/// Vertices per rank sample.
const RANK_BLOCK: u64 = 256;

/// Below this many keys the peeling threshold does not hold yet.
const SMALL_SET: usize = 32;
const SMALL_SET_GAMMA: f64 = 2.0;

/// g value of a vertex no key selects.
const UNASSIGNED: u8 = 3;

/// Builds the fallback over `keys`, which must be unique, and appends it to
/// `out`. Every key is assigned a distinct index in `[0, keys.len())`.
///
/// The segment grows by an eighth after every `rehash_limit` failed rounds,
/// so distinct keys always peel. `Unresolvable` is only returned once the
/// segment is far beyond any size a set of distinct keys needs, which means
/// the keys collide under `hash`.
pub fn generate<K, H>(
    hash: &H,
    keys: &[&K],
    cfg: &BdzConfig,
    out: &mut BitBuffer,
) -> Result<(), MphError>
where
    K: ?Sized,
    H: UniversalHash<K>,
{
    let n = keys.len();
    out.write_elias_delta(n as u64 + 1);
    if n == 0 {
        return Ok(());
    }
    let gamma = if n < SMALL_SET {
        cfg.gamma.max(SMALL_SET_GAMMA)
    } else {
        cfg.gamma
    };
    let mut segment = ((gamma * n as f64 / 3.0).ceil() as u64).max(2);
    let segment_limit = 8 * n as u64 + 64;
    let rounds_per_size = cfg.rehash_limit.max(1);

    let mut round = 0u32;
    while segment <= segment_limit {
        for _ in 0..rounds_per_size {
            let index = hash_index(cfg.salt, round);
            round = round.wrapping_add(1);
            let edges: Vec<[u32; 3]> = keys
                .iter()
                .map(|k| vertices(hash.universal_hash(k, index), segment))
                .collect();
            if let Some(g) = assign(&edges, segment) {
                out.write_bits(index, 64);
                out.write_elias_delta(segment + 1);
                write_tables(out, &g, n as u64);
                tracing::debug!(keys = n, round, segment, "fallback hypergraph peeled");
                return Ok(());
            }
        }
        segment += (segment / 8).max(1);
    }
    Err(MphError::Unresolvable)
}

fn write_tables(out: &mut BitBuffer, g: &[u8], n: u64) {
    for &v in g {
        out.write_bits(v as u64, 2);
    }
    let width = bit_width(n);
    let mut assigned = 0u64;
    for block in g.chunks(RANK_BLOCK as usize) {
        out.write_bits(assigned, width);
        assigned += block.iter().filter(|&&v| v != UNASSIGNED).count() as u64;
    }
    assert_eq!(assigned, n, "every key owns exactly one vertex");
}

/// Reader over a fallback stream embedded in a description.
#[derive(Debug, Clone, Copy)]
pub struct BdzReader<'a> {
    buf: &'a BitBuffer,
    n: u64,
    index: u64,
    segment: u64,
    g_pos: u64,
    ranks_pos: u64,
    rank_width: u32,
}

impl<'a> BdzReader<'a> {
    pub fn load(buf: &'a BitBuffer, mut pos: u64) -> Self {
        let n = buf.read_elias_delta(&mut pos) - 1;
        let mut reader = Self {
            buf,
            n,
            index: 0,
            segment: 0,
            g_pos: pos,
            ranks_pos: pos,
            rank_width: 0,
        };
        if n == 0 {
            return reader;
        }
        reader.index = buf.read_bits(pos, 64);
        pos += 64;
        reader.segment = buf.read_elias_delta(&mut pos) - 1;
        reader.g_pos = pos;
        reader.ranks_pos = pos + 2 * 3 * reader.segment;
        reader.rank_width = bit_width(n);
        reader
    }

    /// Number of keys in the fallback.
    #[inline]
    pub fn len(&self) -> u64 {
        self.n
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.n == 0
    }

    /// Index of `key` in `[0, len())`; keys outside the set get an arbitrary
    /// index in the same range.
    #[inline]
    pub fn evaluate<K, H>(&self, hash: &H, key: &K) -> u64
    where
        K: ?Sized,
        H: UniversalHash<K>,
    {
        if self.n == 0 {
            return 0;
        }
        let edge = vertices(hash.universal_hash(key, self.index), self.segment);
        let sum: u64 = edge.iter().map(|&v| self.g(v as u64)).sum();
        let vertex = edge[(sum % 3) as usize] as u64;
        self.rank(vertex).min(self.n - 1)
    }

    #[inline]
    fn g(&self, vertex: u64) -> u64 {
        self.buf.read_bits(self.g_pos + 2 * vertex, 2)
    }

    /// Number of assigned vertices before `vertex`.
    fn rank(&self, vertex: u64) -> u64 {
        let block = vertex / RANK_BLOCK;
        let mut rank = self
            .buf
            .read_bits(self.ranks_pos + block * self.rank_width as u64, self.rank_width);
        let mut pos = self.g_pos + 2 * block * RANK_BLOCK;
        let mut left = vertex - block * RANK_BLOCK;
        while left > 0 {
            let take = left.min(32);
            let pairs = self.buf.read_bits(pos, 2 * take as u32);
            rank += take - unassigned_pairs(pairs);
            pos += 2 * take;
            left -= take;
        }
        rank
    }
}

/// Number of 2-bit fields equal to `UNASSIGNED` in a right-aligned word.
#[inline]
fn unassigned_pairs(word: u64) -> u64 {
    (word & (word >> 1) & 0x5555_5555_5555_5555).count_ones() as u64
}

/// Peels the hypergraph and assigns g[] so that every edge selects its own
/// pivot vertex.
/// Steps:
/// 1) degrees and CSR (deg/off/edges)
/// 2) peel (queue vertices of degree 1)
/// 3) assign g[] in reverse peel order
fn assign(edges: &[[u32; 3]], segment: u64) -> Option<Vec<u8>> {
    let m = (3 * segment) as usize;

    let mut deg = vec![0u32; m];
    for edge in edges {
        for &v in edge {
            deg[v as usize] += 1;
        }
    }

    // Prefix sums -> offsets
    let mut off = vec![0usize; m + 1];
    for i in 0..m {
        off[i + 1] = off[i] + deg[i] as usize;
    }
    let mut cur = off.clone();
    let mut incidence = vec![0u32; off[m]];
    for (eid, edge) in edges.iter().enumerate() {
        for &v in edge {
            let slot = &mut cur[v as usize];
            incidence[*slot] = eid as u32;
            *slot += 1;
        }
    }

    // Peeling: queue of vertices with degree == 1
    let mut queue: Vec<u32> = (0..m as u32).filter(|&v| deg[v as usize] == 1).collect();
    let mut head = 0usize;

    // (edge, pivot vertex position within the edge)
    let mut peel_order: Vec<(u32, usize)> = Vec::with_capacity(edges.len());
    let mut removed = vec![false; edges.len()];

    while head < queue.len() {
        let u = queue[head] as usize;
        head += 1;
        if deg[u] != 1 {
            continue;
        }
        let Some(&e) = incidence[off[u]..off[u + 1]]
            .iter()
            .find(|&&e| !removed[e as usize])
        else {
            continue;
        };
        let edge = edges[e as usize];
        let Some(pivot) = edge.iter().position(|&v| v as usize == u) else {
            continue;
        };
        removed[e as usize] = true;
        peel_order.push((e, pivot));
        for &v in &edge {
            let d = &mut deg[v as usize];
            *d -= 1;
            if *d == 1 {
                queue.push(v);
            }
        }
    }

    if peel_order.len() != edges.len() {
        return None;
    }

    // Reverse peel order: the pivot of an edge is never touched by the
    // edges assigned after it. UNASSIGNED counts as 0 mod 3.
    let mut g = vec![UNASSIGNED; m];
    for &(e, pivot) in peel_order.iter().rev() {
        let edge = edges[e as usize];
        let others: usize = (0..3)
            .filter(|&i| i != pivot)
            .map(|i| g[edge[i] as usize] as usize)
            .sum();
        g[edge[pivot] as usize] = ((pivot + 9 - others % 3) % 3) as u8;
    }
    Some(g)
}

/// Hash index of a rehash round. The top bit keeps it clear of the small
/// epoch indices used by the recursive splitting.
#[inline]
fn hash_index(salt: u64, round: u32) -> u64 {
    mix_salt(salt, round) | 1 << 63
}

/// 1x universal hash + splitmix64 -> one vertex in each segment.
#[inline]
fn vertices(base: u64, segment: u64) -> [u32; 3] {
    let a = scale(splitmix64(base ^ 0x9E37_79B9_7F4A_7C15), segment);
    let b = scale(splitmix64(base.wrapping_add(0xA24B_1F6F)), segment);
    let c = scale(splitmix64(base ^ 0x853C_49E6_0A6C_9D39), segment);
    [a as u32, (segment + b) as u32, (2 * segment + c) as u32]
}
