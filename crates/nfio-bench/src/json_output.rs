use serde::Serialize;

use crate::report::PassResult;
use crate::runner::BenchOpts;

const MEBIBYTE: f64 = 1_048_576.0;

/// Top-level JSON result document.
#[derive(Serialize)]
pub struct JsonDocument {
    pub version: String,
    pub command_line: String,
    pub num_procs: i32,
    pub parameters: JsonParameters,
    pub results: Vec<JsonResult>,
}

#[derive(Serialize)]
pub struct JsonParameters {
    pub nfiles: i32,
    pub prefix: String,
    pub grouping: String,
    pub dynamic: bool,
    #[serde(rename = "bytesPerRank")]
    pub bytes_per_rank: i64,
    #[serde(rename = "bufferSize")]
    pub buffer_size: usize,
    pub ntimes: i32,
    #[serde(rename = "readBack")]
    pub read_back: bool,
}

#[derive(Serialize)]
pub struct JsonResult {
    pub access: String,
    #[serde(rename = "bwMiB")]
    pub bw_mib: f64,
    #[serde(rename = "readyTime")]
    pub ready_time: f64,
    #[serde(rename = "ioTime")]
    pub io_time: f64,
    #[serde(rename = "closeTime")]
    pub close_time: f64,
    #[serde(rename = "totalTime")]
    pub total_time: f64,
    #[serde(rename = "dataMoved")]
    pub data_moved: i64,
    pub rep: i32,
}

/// Build the JSON document from the finished run (rank 0 only).
pub fn build_document(
    opts: &BenchOpts,
    num_procs: i32,
    results: &[PassResult],
    command_line: &str,
) -> JsonDocument {
    JsonDocument {
        version: env!("CARGO_PKG_VERSION").to_string(),
        command_line: command_line.to_string(),
        num_procs,
        parameters: JsonParameters {
            nfiles: opts.nfiles,
            prefix: opts.prefix.clone(),
            grouping: format!("{:?}", opts.mode),
            dynamic: opts.dynamic,
            bytes_per_rank: opts.bytes_per_rank,
            buffer_size: opts.buffer_size,
            ntimes: opts.ntimes,
            read_back: opts.read_back,
        },
        results: results
            .iter()
            .map(|r| JsonResult {
                access: r.access.clone(),
                bw_mib: r.bw / MEBIBYTE,
                ready_time: r.ready_time,
                io_time: r.io_time,
                close_time: r.close_time,
                total_time: r.total_time,
                data_moved: r.data_moved,
                rep: r.rep,
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nfio_core::GroupingMode;

    fn opts() -> BenchOpts {
        BenchOpts {
            nfiles: 4,
            prefix: "out".to_string(),
            mode: GroupingMode::Interleaved,
            dynamic: true,
            decider: None,
            bytes_per_rank: 1_048_576,
            buffer_size: 262_144,
            ntimes: 1,
            read_back: false,
            keep_files: false,
        }
    }

    #[test]
    fn test_document_serializes() {
        let results = vec![PassResult {
            access: "dynamic write".to_string(),
            bw: 2.0 * MEBIBYTE,
            ready_time: 0.1,
            io_time: 0.8,
            close_time: 0.05,
            total_time: 0.95,
            data_moved: 8_388_608,
            rep: 0,
        }];
        let doc = build_document(&opts(), 8, &results, "nfio-bench -n 4 -d");
        let json = serde_json::to_string_pretty(&doc).unwrap();

        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed["num_procs"], 8);
        assert_eq!(parsed["parameters"]["nfiles"], 4);
        assert_eq!(parsed["parameters"]["dynamic"], true);
        assert_eq!(parsed["results"][0]["bwMiB"], 2.0);
        assert_eq!(parsed["results"][0]["access"], "dynamic write");
    }

    #[test]
    fn test_empty_results() {
        let doc = build_document(&opts(), 2, &[], "nfio-bench");
        let json = serde_json::to_string(&doc).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert!(parsed["results"].as_array().unwrap().is_empty());
    }
}
