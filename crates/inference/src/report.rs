use serde::Serialize;

/// Probabilities strictly above the threshold classify positive; the
/// threshold itself classifies negative.
pub const DECISION_THRESHOLD: f32 = 0.5;

pub const POSITIVE_LABEL: &str = "Stroke Detected";
pub const NEGATIVE_LABEL: &str = "No Stroke Detected";

/// Request-scoped facts about the uploaded scan reported back alongside the
/// decision.
#[derive(Debug, Clone)]
pub struct ScanMetadata {
    pub stored_path: String,
    pub file_name: String,
    pub width: u32,
    pub height: u32,
    pub byte_size: u64,
}

/// The structured decision payload returned to the caller.
#[derive(Debug, Clone, Serialize)]
pub struct Prediction {
    pub result: &'static str,
    pub confidence: f32,
    pub image_path: String,
    pub file_name: String,
    pub dimensions: String,
    pub file_size: f64,
}

pub fn build_prediction(probability: f32, scan: &ScanMetadata) -> Prediction {
    let result = if probability > DECISION_THRESHOLD {
        POSITIVE_LABEL
    } else {
        NEGATIVE_LABEL
    };

    Prediction {
        result,
        confidence: probability,
        image_path: scan.stored_path.clone(),
        file_name: scan.file_name.clone(),
        dimensions: format!("{} x {}", scan.width, scan.height),
        file_size: kilobytes(scan.byte_size),
    }
}

/// Size on disk in kilobytes, rounded to two decimals.
fn kilobytes(bytes: u64) -> f64 {
    (bytes as f64 / 1024.0 * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scan(byte_size: u64) -> ScanMetadata {
        ScanMetadata {
            stored_path: "static/uploads/scan.png".to_string(),
            file_name: "scan.png".to_string(),
            width: 640,
            height: 480,
            byte_size,
        }
    }

    #[test]
    fn exactly_one_half_classifies_negative() {
        let prediction = build_prediction(0.5, &scan(2048));
        assert_eq!(prediction.result, NEGATIVE_LABEL);
        assert_eq!(prediction.confidence, 0.5);
    }

    #[test]
    fn strictly_above_one_half_classifies_positive() {
        assert_eq!(build_prediction(0.500001, &scan(2048)).result, POSITIVE_LABEL);
        assert_eq!(build_prediction(0.99, &scan(2048)).result, POSITIVE_LABEL);
        assert_eq!(build_prediction(0.0, &scan(2048)).result, NEGATIVE_LABEL);
    }

    #[test]
    fn dimensions_read_width_by_height() {
        assert_eq!(build_prediction(0.3, &scan(2048)).dimensions, "640 x 480");
    }

    #[test]
    fn file_size_is_kilobytes_to_two_decimals() {
        assert_eq!(build_prediction(0.3, &scan(2048)).file_size, 2.0);
        assert_eq!(build_prediction(0.3, &scan(1000)).file_size, 0.98);
        assert_eq!(build_prediction(0.3, &scan(1536)).file_size, 1.5);
    }

    #[test]
    fn payload_serializes_with_the_wire_keys() {
        let value = serde_json::to_value(build_prediction(0.75, &scan(2048))).unwrap();
        let object = value.as_object().unwrap();
        for key in [
            "result",
            "confidence",
            "image_path",
            "file_name",
            "dimensions",
            "file_size",
        ] {
            assert!(object.contains_key(key), "missing key {key}");
        }
        assert_eq!(object["result"], "Stroke Detected");
        assert_eq!(object["file_size"], 2.0);
    }
}
