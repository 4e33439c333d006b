/// Class id the pipeline records for every detection.
pub const PERSON_CLASS_ID: u32 = 0;

/// One box produced by a backend, normalized to the source image (0..1).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoxDetection {
    pub class_id: u32,
    /// Box center x.
    pub xc: f64,
    /// Box center y.
    pub yc: f64,
    pub w: f64,
    pub h: f64,
    pub score: f64,
}

/// A backend box bound to the image it was found in. One `labels.csv` row.
#[derive(Clone, Debug, PartialEq)]
pub struct Detection {
    /// Relative POSIX path of the source image.
    pub image: String,
    pub label: u32,
    pub xc: f64,
    pub yc: f64,
    pub w: f64,
    pub h: f64,
    pub score: f64,
}

impl Detection {
    pub fn from_box(image: &str, b: &BoxDetection) -> Self {
        Self {
            image: image.to_string(),
            label: b.class_id,
            xc: b.xc,
            yc: b.yc,
            w: b.w,
            h: b.h,
            score: b.score,
        }
    }
}

/// Inference wall time for one image. One `times.csv` row.
#[derive(Clone, Debug, PartialEq)]
pub struct Timing {
    pub image: String,
    /// Seconds spent decoding and scoring the image.
    pub total: f64,
}
