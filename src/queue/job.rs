use std::time::{Duration, SystemTime};

use uuid::Uuid;

/// A single utterance request, the queue's unit of work.
#[derive(Debug, Clone)]
pub struct SpeakJob {
    /// Unique id, generated at construction.
    pub id: String,
    /// The utterance.
    pub text: String,
    /// Speaker/voice selector; empty means engine default.
    pub voice: String,
    /// Interrupt hint, already consumed by the ingress before enqueue.
    pub interrupt: bool,
    /// Time-to-live; zero means never expires.
    pub ttl: Duration,
    /// Opaque dedupe token; empty disables deduplication.
    pub dedupe_key: String,
    /// Wall time at construction.
    pub created_at: SystemTime,
    /// `created_at + ttl` when `ttl > 0`.
    pub expires_at: Option<SystemTime>,
}

impl SpeakJob {
    pub fn new(
        text: impl Into<String>,
        voice: impl Into<String>,
        interrupt: bool,
        ttl: Duration,
        dedupe_key: impl Into<String>,
    ) -> Self {
        let now = SystemTime::now();
        let expires_at = if ttl > Duration::ZERO {
            Some(now + ttl)
        } else {
            None
        };

        Self {
            id: Uuid::new_v4().to_string(),
            text: text.into(),
            voice: voice.into(),
            interrupt,
            ttl,
            dedupe_key: dedupe_key.into(),
            created_at: now,
            expires_at,
        }
    }

    /// Whether the job has outlived its TTL.
    pub fn is_expired(&self) -> bool {
        match self.expires_at {
            Some(deadline) => SystemTime::now() > deadline,
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique() {
        let a = SpeakJob::new("a", "", false, Duration::ZERO, "");
        let b = SpeakJob::new("b", "", false, Duration::ZERO, "");
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn zero_ttl_never_expires() {
        let job = SpeakJob::new("hello", "", false, Duration::ZERO, "");
        assert!(job.expires_at.is_none());
        assert!(!job.is_expired());
    }

    #[test]
    fn positive_ttl_sets_deadline() {
        let job = SpeakJob::new("hello", "", false, Duration::from_secs(30), "");
        let deadline = job.expires_at.expect("deadline");
        assert_eq!(deadline, job.created_at + Duration::from_secs(30));
        assert!(!job.is_expired());
    }

    #[test]
    fn tiny_ttl_expires() {
        let job = SpeakJob::new("hello", "", false, Duration::from_millis(1), "");
        std::thread::sleep(Duration::from_millis(10));
        assert!(job.is_expired());
    }
}
