use crate::discover::ProbeResult;

/// Orientation bucket an upload is filed under in object storage
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) enum AspectCategory {
    Landscape,
    Portrait,
    Other,
}

// open intervals, checked in order
const LANDSCAPE: (f64, f64) = (1.7, 1.8);
const PORTRAIT: (f64, f64) = (0.55, 0.6);

impl AspectCategory {
    pub(crate) fn classify(width: u32, height: u32) -> Self {
        if height == 0 {
            return Self::Other;
        }

        let ratio = f64::from(width) / f64::from(height);

        if ratio > LANDSCAPE.0 && ratio < LANDSCAPE.1 {
            Self::Landscape
        } else if ratio > PORTRAIT.0 && ratio < PORTRAIT.1 {
            Self::Portrait
        } else {
            Self::Other
        }
    }

    pub(crate) const fn as_str(&self) -> &'static str {
        match self {
            Self::Landscape => "landscape",
            Self::Portrait => "portrait",
            Self::Other => "other",
        }
    }

    pub(crate) fn from_name(s: &str) -> Option<Self> {
        match s {
            "landscape" => Some(Self::Landscape),
            "portrait" => Some(Self::Portrait),
            "other" => Some(Self::Other),
            _ => None,
        }
    }
}

impl From<ProbeResult> for AspectCategory {
    fn from(ProbeResult { width, height }: ProbeResult) -> Self {
        Self::classify(width, height)
    }
}

impl std::fmt::Display for AspectCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::AspectCategory;

    #[test]
    fn common_resolutions() {
        let cases = [
            (1920, 1080, AspectCategory::Landscape),
            (1280, 720, AspectCategory::Landscape),
            (3840, 2160, AspectCategory::Landscape),
            (1080, 1920, AspectCategory::Portrait),
            (720, 1280, AspectCategory::Portrait),
            (1080, 1080, AspectCategory::Other),
            (640, 480, AspectCategory::Other),
            (2560, 1080, AspectCategory::Other),
        ];

        for (width, height, expected) in cases {
            assert_eq!(
                AspectCategory::classify(width, height),
                expected,
                "{width}x{height}"
            );
        }
    }

    #[test]
    fn boundaries_are_excluded() {
        // 1.7, 1.8, 0.55 and 0.6 exactly
        assert_eq!(AspectCategory::classify(170, 100), AspectCategory::Other);
        assert_eq!(AspectCategory::classify(180, 100), AspectCategory::Other);
        assert_eq!(AspectCategory::classify(55, 100), AspectCategory::Other);
        assert_eq!(AspectCategory::classify(60, 100), AspectCategory::Other);
    }

    #[test]
    fn just_inside_boundaries() {
        assert_eq!(
            AspectCategory::classify(1701, 1000),
            AspectCategory::Landscape
        );
        assert_eq!(
            AspectCategory::classify(1799, 1000),
            AspectCategory::Landscape
        );
        assert_eq!(AspectCategory::classify(551, 1000), AspectCategory::Portrait);
        assert_eq!(AspectCategory::classify(599, 1000), AspectCategory::Portrait);
    }

    #[test]
    fn zero_height_is_other() {
        assert_eq!(AspectCategory::classify(1920, 0), AspectCategory::Other);
    }

    #[test]
    fn names() {
        for category in [
            AspectCategory::Landscape,
            AspectCategory::Portrait,
            AspectCategory::Other,
        ] {
            assert_eq!(AspectCategory::from_name(category.as_str()), Some(category));
        }

        assert_eq!(AspectCategory::from_name("square"), None);
    }
}
