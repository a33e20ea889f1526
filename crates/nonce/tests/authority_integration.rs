use pedigree_nonce::digest::{digests_match, sha256_hex};
use pedigree_nonce::{
    ManualClock, MemoryNonceStore, NonceAuthority, NonceConfig, NonceError, NonceResult,
    NonceRng, NonceStore, StdNonceRng, SystemClock,
};
use std::collections::HashSet;
use std::hint::black_box;
use std::sync::{Arc, Barrier};
use std::time::{Duration, Instant};

fn default_authority() -> NonceAuthority {
    NonceAuthority::new(&NonceConfig::default())
}

#[test]
fn test_issued_values_are_unique() {
    let authority = default_authority();
    let mut ids = HashSet::new();
    let mut raws = HashSet::new();

    for _ in 0..10_000 {
        let issued = authority.issue().expect("issue should succeed");
        assert!(ids.insert(issued.nonce_id));
        assert!(raws.insert(issued.raw_nonce));
    }
    assert_eq!(authority.len(), 10_000);
}

#[test]
fn test_round_trip() {
    let authority = default_authority();
    let issued = authority.issue().unwrap();

    assert_eq!(sha256_hex(&issued.raw_nonce), issued.hashed_nonce);
    authority
        .check(&issued.nonce_id, &issued.raw_nonce)
        .expect("freshly issued nonce should validate");
}

#[test]
fn test_single_use() {
    let authority = default_authority();
    let issued = authority.issue().unwrap();

    authority.mark_used(&issued.nonce_id).unwrap();
    assert_eq!(
        authority.mark_used(&issued.nonce_id),
        Err(NonceError::NonceAlreadyUsed)
    );
    assert_eq!(
        authority.check(&issued.nonce_id, &issued.raw_nonce),
        Err(NonceError::NonceAlreadyUsed)
    );
}

#[test]
fn test_tampered_nonce_is_rejected() {
    let authority = default_authority();
    let issued = authority.issue().unwrap();

    let appended = format!("{}x", issued.raw_nonce);
    assert_eq!(
        authority.check(&issued.nonce_id, &appended),
        Err(NonceError::InvalidNonce)
    );

    let mut flipped = issued.raw_nonce.clone().into_bytes();
    flipped[0] = if flipped[0] == b'0' { b'1' } else { b'0' };
    let flipped = String::from_utf8(flipped).unwrap();
    assert_eq!(
        authority.check(&issued.nonce_id, &flipped),
        Err(NonceError::InvalidNonce)
    );

    // 被篡改的尝试不影响原 nonce
    authority.check(&issued.nonce_id, &issued.raw_nonce).unwrap();
}

#[test]
fn test_unknown_id_is_rejected() {
    let authority = default_authority();
    let issued = authority.issue().unwrap();
    assert_eq!(
        authority.check("nonexistent-id", &issued.raw_nonce),
        Err(NonceError::UnknownOrExpiredNonce)
    );
    assert_eq!(
        authority.mark_used("nonexistent-id"),
        Err(NonceError::UnknownOrExpiredNonce)
    );
}

#[test]
fn test_expired_nonce_is_evicted_on_check() {
    let authority = default_authority();
    let before = authority.len();

    let issued = authority.issue_with_ttl(Duration::from_millis(1)).unwrap();
    assert_eq!(authority.len(), before + 1);
    std::thread::sleep(Duration::from_millis(10));

    assert_eq!(
        authority.check(&issued.nonce_id, &issued.raw_nonce),
        Err(NonceError::UnknownOrExpiredNonce)
    );
    assert_eq!(
        authority.check(&issued.nonce_id, &issued.raw_nonce),
        Err(NonceError::UnknownOrExpiredNonce)
    );
    assert_eq!(authority.len(), before);
}

#[test]
fn test_sweep_keeps_only_live_entries() {
    let authority = default_authority();
    for _ in 0..100 {
        authority.issue_with_ttl(Duration::from_millis(1)).unwrap();
    }
    let long_lived: Vec<_> = (0..100)
        .map(|_| authority.issue_with_ttl(Duration::from_secs(3600)).unwrap())
        .collect();
    std::thread::sleep(Duration::from_millis(10));

    assert_eq!(authority.sweep_expired(), 100);
    assert_eq!(authority.len(), 100);
    for issued in &long_lived {
        authority.check(&issued.nonce_id, &issued.raw_nonce).unwrap();
    }
}

#[test]
fn test_asymmetric_pair_is_rejected() {
    let authority = default_authority();
    let issued = authority.issue().unwrap();

    assert_eq!(
        authority.validate_nonce_if_provided(Some(&issued.raw_nonce), None),
        Err(NonceError::MalformedPair)
    );
    assert_eq!(
        authority.validate_nonce_if_provided(None, Some(&issued.nonce_id)),
        Err(NonceError::MalformedPair)
    );

    assert_eq!(authority.len(), 1);
    authority.validate_nonce_if_provided(None, None).unwrap();
    assert_eq!(authority.len(), 1);

    authority
        .validate_nonce_if_provided(Some(&issued.raw_nonce), Some(&issued.nonce_id))
        .unwrap();
    // 可选校验同样不消费 nonce
    authority.mark_used(&issued.nonce_id).unwrap();
}

#[test]
fn test_concurrent_mark_used_succeeds_once() {
    let authority = Arc::new(default_authority());
    let issued = authority.issue().unwrap();
    let barrier = Arc::new(Barrier::new(50));

    let handles: Vec<_> = (0..50)
        .map(|_| {
            let authority = authority.clone();
            let barrier = barrier.clone();
            let nonce_id = issued.nonce_id.clone();
            std::thread::spawn(move || {
                barrier.wait();
                authority.mark_used(&nonce_id)
            })
        })
        .collect();

    let results: Vec<NonceResult<()>> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    let successes = results.iter().filter(|r| r.is_ok()).count();
    let replays = results
        .iter()
        .filter(|r| matches!(r, Err(NonceError::NonceAlreadyUsed)))
        .count();

    assert_eq!(successes, 1);
    assert_eq!(replays, 49);
}

#[test]
fn test_sweep_concurrent_with_consumption_spares_live_entries() {
    let clock = Arc::new(ManualClock::new(1_000_000));
    let authority = Arc::new(NonceAuthority::with_parts(
        Arc::new(MemoryNonceStore::new()),
        clock.clone(),
        Arc::new(StdNonceRng::seeded(9)),
        Duration::from_secs(300),
    ));
    let live: Vec<_> = (0..200).map(|_| authority.issue().unwrap()).collect();
    for _ in 0..200 {
        authority.issue_with_ttl(Duration::from_millis(1)).unwrap();
    }
    clock.advance(Duration::from_millis(5));

    let sweeper = {
        let authority = authority.clone();
        std::thread::spawn(move || {
            let mut removed = 0;
            for _ in 0..20 {
                removed += authority.sweep_expired();
            }
            removed
        })
    };
    for issued in &live {
        authority.mark_used(&issued.nonce_id).unwrap();
    }

    assert_eq!(sweeper.join().unwrap(), 200);
    assert_eq!(authority.len(), 200);
}

/// 总是输出相同字节的随机数源
struct StuckRng;

impl NonceRng for StuckRng {
    fn fill(&self, dest: &mut [u8]) -> NonceResult<()> {
        dest.fill(0xAB);
        Ok(())
    }
}

/// 熵源不可用的随机数源
struct BrokenRng;

impl NonceRng for BrokenRng {
    fn fill(&self, _dest: &mut [u8]) -> NonceResult<()> {
        Err(NonceError::EntropyUnavailable("getrandom failed".into()))
    }
}

#[test]
fn test_identifier_collision_is_reported() {
    let store = Arc::new(MemoryNonceStore::new());
    let authority = NonceAuthority::with_parts(
        store.clone(),
        Arc::new(SystemClock),
        Arc::new(StuckRng),
        Duration::from_secs(300),
    );

    authority.issue().unwrap();
    assert!(matches!(
        authority.issue(),
        Err(NonceError::IdentifierCollision(_))
    ));
    assert_eq!(store.len(), 1);
}

#[test]
fn test_entropy_failure_aborts_issue() {
    let store = Arc::new(MemoryNonceStore::new());
    let authority = NonceAuthority::with_parts(
        store.clone(),
        Arc::new(SystemClock),
        Arc::new(BrokenRng),
        Duration::from_secs(300),
    );

    assert!(matches!(
        authority.issue(),
        Err(NonceError::EntropyUnavailable(_))
    ));
    assert!(store.is_empty());
}

#[test]
fn test_shared_store_between_authorities() {
    let store: Arc<dyn NonceStore> = Arc::new(MemoryNonceStore::new());
    let issuer = NonceAuthority::with_parts(
        store.clone(),
        Arc::new(SystemClock),
        Arc::new(StdNonceRng::seeded(3)),
        Duration::from_secs(300),
    );
    let verifier = NonceAuthority::with_parts(
        store,
        Arc::new(SystemClock),
        Arc::new(StdNonceRng::seeded(4)),
        Duration::from_secs(300),
    );

    let issued = issuer.issue().unwrap();
    verifier.check(&issued.nonce_id, &issued.raw_nonce).unwrap();
    verifier.mark_used(&issued.nonce_id).unwrap();
    assert_eq!(
        issuer.mark_used(&issued.nonce_id),
        Err(NonceError::NonceAlreadyUsed)
    );
}

fn median_batch_nanos(expected: &str, candidate: &str, samples: &mut Vec<u128>) {
    const BATCH: usize = 2_000;
    let start = Instant::now();
    for _ in 0..BATCH {
        black_box(digests_match(black_box(expected), black_box(candidate)));
    }
    samples.push(start.elapsed().as_nanos());
}

fn median(mut samples: Vec<u128>) -> u128 {
    samples.sort_unstable();
    samples[samples.len() / 2].max(1)
}

#[test]
fn test_comparison_time_independent_of_mismatch_position() {
    let expected = sha256_hex("timing-test-secret");

    let mut early = expected.clone().into_bytes();
    early[0] = if early[0] == b'0' { b'1' } else { b'0' };
    let early = String::from_utf8(early).unwrap();

    let mut late = expected.clone().into_bytes();
    let last = late.len() - 1;
    late[last] = if late[last] == b'0' { b'1' } else { b'0' };
    let late = String::from_utf8(late).unwrap();

    let mut early_samples = Vec::new();
    let mut late_samples = Vec::new();
    for _ in 0..200 {
        median_batch_nanos(&expected, &early, &mut early_samples);
        median_batch_nanos(&expected, &late, &mut late_samples);
    }

    let early = median(early_samples) as f64;
    let late = median(late_samples) as f64;
    let ratio = late / early;
    assert!(
        (0.5..2.0).contains(&ratio),
        "mismatch position changed comparison time: early={early}ns late={late}ns"
    );
}
