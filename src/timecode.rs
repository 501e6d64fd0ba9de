//! Seek-offset formatting for ffmpeg's `-ss` / `-t` arguments.
//!
//! Produces `H:M:S.mmm` with every field unpadded (`0:0:0.0`, `1:1:1.1`).
//! ffmpeg's duration parser accepts unpadded fields, and the fields can be
//! multiplied back out to recover the exact millisecond value.

pub fn format(ms: u64) -> String {
    let hours = ms / 3_600_000;
    let minutes = ms / 60_000 % 60;
    let seconds = ms / 1000 % 60;
    let millis = ms % 1000;
    format!("{hours}:{minutes}:{seconds}.{millis}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reconstruct(tc: &str) -> u64 {
        let (hms, millis) = tc.split_once('.').unwrap();
        let fields: Vec<u64> = hms.split(':').map(|f| f.parse().unwrap()).collect();
        assert_eq!(fields.len(), 3, "unexpected timecode {tc}");
        fields[0] * 3_600_000 + fields[1] * 60_000 + fields[2] * 1000 + millis.parse::<u64>().unwrap()
    }

    #[test]
    fn zero() {
        assert_eq!(format(0), "0:0:0.0");
    }

    #[test]
    fn one_of_each_field() {
        assert_eq!(format(3_661_001), "1:1:1.1");
    }

    #[test]
    fn clip_duration() {
        assert_eq!(format(10_000), "0:0:10.0");
    }

    #[test]
    fn hours_are_not_wrapped() {
        assert_eq!(format(100 * 3_600_000 + 59 * 60_000 + 59_999), "100:59:59.999");
    }

    #[test]
    fn fields_multiply_back_to_input() {
        for ms in [0, 1, 999, 1000, 59_999, 60_000, 3_599_999, 3_600_000, 86_399_999, 1_234_567_891] {
            assert_eq!(reconstruct(&format(ms)), ms, "round trip failed for {ms}");
        }
        // Sweep a stride that hits every field boundary at least once.
        let mut ms = 0u64;
        while ms < 8 * 3_600_000 {
            assert_eq!(reconstruct(&format(ms)), ms);
            ms += 7_919;
        }
    }
}
