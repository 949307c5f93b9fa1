//! Facial landmark model
//!
//! Landmarks are stored under a fixed set of known keys so the estimator can
//! check its required points statically. Anything an extractor reports that is
//! not a known key lands in the extension map and is never used for matching.

pub mod manifest;

use crate::error::{AlignError, AlignResult};
use crate::utils::SourceImage;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

pub use manifest::ManifestExtractor;

/// A 2D point in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &Point) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }

    pub fn midpoint(&self, other: &Point) -> Point {
        Point::new((self.x + other.x) / 2.0, (self.y + other.y) / 2.0)
    }

    pub fn norm(&self) -> f64 {
        (self.x * self.x + self.y * self.y).sqrt()
    }
}

impl std::ops::Add for Point {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Point::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl std::ops::Sub for Point {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Point::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl std::ops::Mul<f64> for Point {
    type Output = Self;

    fn mul(self, rhs: f64) -> Self::Output {
        Point::new(self.x * rhs, self.y * rhs)
    }
}

/// Known landmark names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LandmarkKey {
    LeftEye,
    RightEye,
    Nose,
    NoseTip,
    Mouth,
    Chin,
    Forehead,
    #[serde(alias = "left_eye_outer")]
    LeftEyeCorner,
    #[serde(alias = "right_eye_outer")]
    RightEyeCorner,
    LeftEyeInner,
    RightEyeInner,
    TopNose,
    BottomNose,
    LeftMouth,
    RightMouth,
    UpperLip,
    LowerLip,
}

impl LandmarkKey {
    pub const ALL: [LandmarkKey; 17] = [
        LandmarkKey::LeftEye,
        LandmarkKey::RightEye,
        LandmarkKey::Nose,
        LandmarkKey::NoseTip,
        LandmarkKey::Mouth,
        LandmarkKey::Chin,
        LandmarkKey::Forehead,
        LandmarkKey::LeftEyeCorner,
        LandmarkKey::RightEyeCorner,
        LandmarkKey::LeftEyeInner,
        LandmarkKey::RightEyeInner,
        LandmarkKey::TopNose,
        LandmarkKey::BottomNose,
        LandmarkKey::LeftMouth,
        LandmarkKey::RightMouth,
        LandmarkKey::UpperLip,
        LandmarkKey::LowerLip,
    ];

    /// Points every usable reference must carry.
    pub const MANDATORY: [LandmarkKey; 3] =
        [LandmarkKey::LeftEye, LandmarkKey::RightEye, LandmarkKey::NoseTip];

    pub fn as_str(&self) -> &'static str {
        match self {
            LandmarkKey::LeftEye => "left_eye",
            LandmarkKey::RightEye => "right_eye",
            LandmarkKey::Nose => "nose",
            LandmarkKey::NoseTip => "nose_tip",
            LandmarkKey::Mouth => "mouth",
            LandmarkKey::Chin => "chin",
            LandmarkKey::Forehead => "forehead",
            LandmarkKey::LeftEyeCorner => "left_eye_corner",
            LandmarkKey::RightEyeCorner => "right_eye_corner",
            LandmarkKey::LeftEyeInner => "left_eye_inner",
            LandmarkKey::RightEyeInner => "right_eye_inner",
            LandmarkKey::TopNose => "top_nose",
            LandmarkKey::BottomNose => "bottom_nose",
            LandmarkKey::LeftMouth => "left_mouth",
            LandmarkKey::RightMouth => "right_mouth",
            LandmarkKey::UpperLip => "upper_lip",
            LandmarkKey::LowerLip => "lower_lip",
        }
    }
}

impl fmt::Display for LandmarkKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LandmarkKey {
    type Err = AlignError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "left_eye_outer" => return Ok(LandmarkKey::LeftEyeCorner),
            "right_eye_outer" => return Ok(LandmarkKey::RightEyeCorner),
            _ => {}
        }
        LandmarkKey::ALL
            .iter()
            .copied()
            .find(|key| key.as_str() == s)
            .ok_or_else(|| AlignError::InsufficientLandmarks(format!("unknown landmark '{}'", s)))
    }
}

/// Named keypoints of one face.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LandmarkMap {
    points: BTreeMap<LandmarkKey, Point>,
    /// Debug-only points the estimator never matches on.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    extra: BTreeMap<String, Point>,
}

impl LandmarkMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a map from loosely named points; unknown names go to the
    /// extension map.
    pub fn from_named<I, S>(points: I) -> Self
    where
        I: IntoIterator<Item = (S, Point)>,
        S: AsRef<str>,
    {
        let mut map = Self::new();
        for (name, point) in points {
            match name.as_ref().parse::<LandmarkKey>() {
                Ok(key) => {
                    map.points.insert(key, point);
                }
                Err(_) => {
                    map.extra.insert(name.as_ref().to_string(), point);
                }
            }
        }
        map
    }

    pub fn with(mut self, key: LandmarkKey, point: Point) -> Self {
        self.points.insert(key, point);
        self
    }

    pub fn insert(&mut self, key: LandmarkKey, point: Point) {
        self.points.insert(key, point);
    }

    pub fn insert_extra(&mut self, name: impl Into<String>, point: Point) {
        self.extra.insert(name.into(), point);
    }

    pub fn get(&self, key: LandmarkKey) -> Option<Point> {
        self.points.get(&key).copied()
    }

    pub fn contains(&self, key: LandmarkKey) -> bool {
        self.points.contains_key(&key)
    }

    pub fn require(&self, key: LandmarkKey) -> AlignResult<Point> {
        self.get(key)
            .ok_or_else(|| AlignError::InsufficientLandmarks(format!("missing '{}'", key)))
    }

    /// Left and right eye centers, the minimum any usable map must have.
    pub fn eyes(&self) -> Option<(Point, Point)> {
        Some((self.get(LandmarkKey::LeftEye)?, self.get(LandmarkKey::RightEye)?))
    }

    pub fn has_eyes(&self) -> bool {
        self.eyes().is_some()
    }

    pub fn keys(&self) -> impl Iterator<Item = LandmarkKey> + '_ {
        self.points.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (LandmarkKey, Point)> + '_ {
        self.points.iter().map(|(k, p)| (*k, *p))
    }

    pub fn extras(&self) -> impl Iterator<Item = (&str, Point)> + '_ {
        self.extra.iter().map(|(k, p)| (k.as_str(), *p))
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Copy of this map with every point (extension points included) mapped
    /// through `f`.
    pub fn transformed(&self, f: impl Fn(Point) -> Point) -> LandmarkMap {
        LandmarkMap {
            points: self.points.iter().map(|(k, p)| (*k, f(*p))).collect(),
            extra: self.extra.iter().map(|(k, p)| (k.clone(), f(*p))).collect(),
        }
    }
}

/// External face landmark detector.
///
/// Implementations receive color pixels and must handle any color-space
/// conversion themselves. `None` means no usable face was found.
pub trait LandmarkExtractor: Send + Sync {
    /// Returns the name of the extractor
    fn name(&self) -> &str;

    fn extract(&self, image: &SourceImage) -> Option<LandmarkMap>;
}
