use super::{FfProbe, ProbeError, ProbeResult, Prober};

fn read_fixture(case: &str) -> Vec<u8> {
    std::fs::read(format!("./src/discover/ffprobe_{case}_details.json")).expect("Read file")
}

fn details_tests() -> [(&'static str, ProbeResult); 3] {
    [
        (
            "landscape",
            ProbeResult {
                width: 1280,
                height: 720,
            },
        ),
        (
            "portrait",
            ProbeResult {
                width: 608,
                height: 1080,
            },
        ),
        (
            "square",
            ProbeResult {
                width: 720,
                height: 720,
            },
        ),
    ]
}

#[test]
fn parse_probe() {
    for (case, expected) in details_tests() {
        let output = super::parse_probe(&read_fixture(case)).expect("Parsed details");

        assert_eq!(output, expected, "{case}");
    }
}

#[test]
fn no_streams() {
    let res = super::parse_probe(&read_fixture("audio_only"));

    assert!(matches!(res, Err(ProbeError::NoStreams)));
}

#[test]
fn zero_width() {
    let res = super::parse_probe(&read_fixture("zero_width"));

    assert!(matches!(
        res,
        Err(ProbeError::Dimensions {
            width: 0,
            height: 720
        })
    ));
}

#[test]
fn negative_height() {
    let res = super::parse_probe(&read_fixture("negative_height"));

    assert!(matches!(res, Err(ProbeError::Dimensions { .. })));
}

#[test]
fn missing_dimensions() {
    let res = super::parse_probe(&read_fixture("no_dimensions"));

    assert!(matches!(res, Err(ProbeError::MissingDimensions)));
}

#[test]
fn garbage_output() {
    let res = super::parse_probe(b"Invalid data found when processing input");

    assert!(matches!(res, Err(ProbeError::Json(_))));
}

#[test]
fn parse_failures_share_error_code() {
    let res = super::parse_probe(b"{}");

    let err = res.expect_err("Empty output has no streams");
    assert_eq!(
        err.error_code(),
        crate::error_code::ErrorCode::METADATA_UNAVAILABLE
    );
    assert!(!err.is_timeout());
}

#[tokio::test]
async fn missing_ffprobe_is_metadata_unavailable() {
    let prober = FfProbe::new(String::from("tubely-missing-ffprobe"), 5);

    let err = prober
        .probe(std::path::Path::new("/nonexistent.mp4"))
        .await
        .expect_err("Command does not exist");

    assert!(matches!(
        err,
        ProbeError::Process(crate::process::ProcessError::NotFound(_))
    ));
    assert_eq!(
        err.error_code(),
        crate::error_code::ErrorCode::METADATA_UNAVAILABLE
    );
}
