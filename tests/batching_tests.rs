use amplitude_importer::config::types::ParseErrorStrategy;
use amplitude_importer::source::{Batch, EventBatcher, ReaderError};
use std::io::Write;
use tempfile::NamedTempFile;

#[cfg(test)]
mod tests {
    use super::*;

    /// Helper: write `count` events, optionally with a bad line after `bad_after`
    fn create_event_file(count: usize, bad_after: Option<usize>) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        for i in 0..count {
            writeln!(
                file,
                r#"{{"seq":{},"user_id":"u{}","event_time":"2024-03-01T10:00:00.{:03}+01:00"}}"#,
                i,
                i % 7,
                i % 1000
            )
            .unwrap();
            if bad_after == Some(i) {
                writeln!(file, r#"{{"seq":-1,"event_time":"sometime"}}"#).unwrap();
            }
        }
        file.flush().unwrap();
        file
    }

    fn collect_batches(file: &NamedTempFile, size: usize) -> Vec<Batch> {
        EventBatcher::open(file.path(), size, ParseErrorStrategy::Abort)
            .unwrap()
            .collect::<Result<Vec<_>, _>>()
            .unwrap()
    }

    #[test]
    fn test_batch_sizes_for_various_files() {
        for (count, size) in [(2500, 1000), (1000, 1000), (1, 1000), (17, 4)] {
            let file = create_event_file(count, None);
            let batches = collect_batches(&file, size);

            assert_eq!(batches.len(), count.div_ceil(size));

            let expected_last = if count % size == 0 { size } else { count % size };
            assert_eq!(batches.last().unwrap().len(), expected_last);
            assert!(batches[..batches.len() - 1].iter().all(|b| b.len() == size));
        }
    }

    #[test]
    fn test_concatenation_reproduces_file_order() {
        let file = create_event_file(53, None);
        let seqs: Vec<i64> = collect_batches(&file, 10)
            .iter()
            .flat_map(|b| b.events.iter().map(|e| e["seq"].as_i64().unwrap()))
            .collect();
        assert_eq!(seqs, (0..53).collect::<Vec<i64>>());
    }

    #[test]
    fn test_time_respects_offset() {
        let file = create_event_file(2, None);
        let batches = collect_batches(&file, 10);

        // 10:00:00.001+01:00 is 09:00:00.001 UTC
        assert_eq!(
            batches[0].events[1]["time"],
            serde_json::json!(1_709_283_600_001_i64)
        );
    }

    #[test]
    fn test_abort_on_malformed_line() {
        let file = create_event_file(10, Some(4));
        let results: Vec<_> = EventBatcher::open(file.path(), 3, ParseErrorStrategy::Abort)
            .unwrap()
            .collect();

        // Lines 1-3 form a batch, the bad line is line 6
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].as_ref().unwrap().len(), 3);
        assert!(matches!(results[1], Err(ReaderError::Malformed { line: 6, .. })));
    }

    #[test]
    fn test_skip_malformed_line() {
        let file = create_event_file(10, Some(4));
        let mut batcher = EventBatcher::open(file.path(), 3, ParseErrorStrategy::Skip).unwrap();
        let total: usize = batcher.by_ref().map(|b| b.unwrap().len()).sum();

        assert_eq!(total, 10);
        assert_eq!(batcher.skipped_lines(), 1);
        assert_eq!(batcher.lines_read(), 11);
    }
}
