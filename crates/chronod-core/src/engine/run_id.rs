//! Run identifier generation.

use rand::Rng;

const BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// `run_<unix-ms>_<9-char base36>`. Unique within a process lifetime.
pub fn generate() -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..9)
        .map(|_| BASE36[rng.gen_range(0..BASE36.len())] as char)
        .collect();
    format!("run_{}_{suffix}", chrono::Utc::now().timestamp_millis())
}

/// Synthetic id for a fire rejected during shutdown.
pub fn skipped() -> String {
    format!("skipped_{}", chrono::Utc::now().timestamp_millis())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generate_shape() {
        let id = generate();
        let parts: Vec<&str> = id.splitn(3, '_').collect();
        assert_eq!(parts[0], "run");
        assert!(parts[1].chars().all(|c| c.is_ascii_digit()));
        assert_eq!(parts[2].len(), 9);
        assert!(
            parts[2]
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
        );
    }

    #[test]
    fn generate_is_unique_enough() {
        let mut seen = std::collections::HashSet::new();
        for _ in 0..1000 {
            assert!(seen.insert(generate()));
        }
    }

    #[test]
    fn skipped_shape() {
        assert!(skipped().starts_with("skipped_"));
    }
}
