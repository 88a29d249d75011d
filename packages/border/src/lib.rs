#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Reference border geometries.
//!
//! A [`Border`] is an ordered list of geometries (national boundaries,
//! coastlines, ...), each an ordered list of points. Extraction rules use
//! it to clip airspace boundaries along a border: find the border points
//! nearest to where the boundary meets it ([`Border::nearest`]) and walk
//! along the border between them ([`Border::segment`]).

use std::collections::BTreeMap;
use std::path::Path;

use geo::{Distance as _, Haversine, Point};
use geojson::GeoJson;

/// Errors raised while loading or querying a [`Border`].
#[derive(Debug, thiserror::Error)]
pub enum BorderError {
    /// Malformed input or a query mixing incompatible positions.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Reading a border file failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path that caused the error.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },
}

/// A geographic point in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Xy {
    /// Latitude, positive north.
    pub lat: f64,
    /// Longitude, positive east.
    pub long: f64,
}

impl Xy {
    /// Creates a point from latitude and longitude.
    #[must_use]
    pub const fn new(lat: f64, long: f64) -> Self {
        Self { lat, long }
    }

    /// Great-circle distance to `other` in meters.
    #[must_use]
    pub fn distance(&self, other: &Self) -> f64 {
        Haversine.distance(
            Point::new(self.long, self.lat),
            Point::new(other.long, other.lat),
        )
    }

    /// Parses a `"lat,long"` string.
    fn parse(s: &str) -> Result<Self, BorderError> {
        let (lat, long) = s
            .split_once(',')
            .ok_or_else(|| BorderError::InvalidArgument(format!("'{s}' is not \"lat,long\"")))?;
        let parse = |v: &str| {
            v.trim()
                .parse::<f64>()
                .map_err(|e| BorderError::InvalidArgument(format!("'{s}': {e}")))
        };
        Ok(Self::new(parse(lat)?, parse(long)?))
    }
}

/// A point on a [`Border`], addressed by geometry and point index.
///
/// Positions are lookup keys only; an out-of-range position simply resolves
/// to no point via [`Border::xy`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Position {
    /// Index of the geometry within the border.
    pub geometry_index: usize,
    /// Index of the point within the geometry.
    pub point_index: usize,
}

impl Position {
    /// Creates a position.
    #[must_use]
    pub const fn new(geometry_index: usize, point_index: usize) -> Self {
        Self {
            geometry_index,
            point_index,
        }
    }
}

/// An immutable collection of point sequences.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Border {
    geometries: Vec<Vec<Xy>>,
}

impl Border {
    /// Builds a border directly from point sequences.
    #[must_use]
    pub const fn from_geometries(geometries: Vec<Vec<Xy>>) -> Self {
        Self { geometries }
    }

    /// Builds a border from lists of `"lat,long"` strings, one list per
    /// geometry.
    ///
    /// # Errors
    ///
    /// Returns [`BorderError::InvalidArgument`] if a string is malformed.
    pub fn from_array<S: AsRef<str>>(geometries: &[Vec<S>]) -> Result<Self, BorderError> {
        let geometries = geometries
            .iter()
            .map(|points| points.iter().map(|p| Xy::parse(p.as_ref())).collect())
            .collect::<Result<Vec<Vec<Xy>>, _>>()?;
        Ok(Self { geometries })
    }

    /// Builds a border from a `GeoJSON` document.
    ///
    /// Line strings, polygon rings and their multi-variants each become one
    /// geometry. Coordinates are `[longitude, latitude]` in `GeoJSON` and are
    /// transposed here.
    ///
    /// # Errors
    ///
    /// Returns [`BorderError::InvalidArgument`] if the document cannot be
    /// parsed or contains no usable geometry.
    pub fn from_geojson(source: &str) -> Result<Self, BorderError> {
        let geojson: GeoJson = source
            .parse()
            .map_err(|e| BorderError::InvalidArgument(format!("invalid GeoJSON: {e}")))?;

        let mut geometries = Vec::new();
        match geojson {
            GeoJson::Geometry(geometry) => collect_geometry(&geometry.value, &mut geometries)?,
            GeoJson::Feature(feature) => {
                if let Some(geometry) = feature.geometry {
                    collect_geometry(&geometry.value, &mut geometries)?;
                }
            }
            GeoJson::FeatureCollection(collection) => {
                for feature in collection.features {
                    if let Some(geometry) = feature.geometry {
                        collect_geometry(&geometry.value, &mut geometries)?;
                    }
                }
            }
        }

        if geometries.is_empty() {
            return Err(BorderError::InvalidArgument(
                "GeoJSON contains no line or polygon geometry".to_string(),
            ));
        }

        Ok(Self { geometries })
    }

    /// Loads a border from a `.geojson` (or `.json`) file.
    ///
    /// # Errors
    ///
    /// Returns [`BorderError::InvalidArgument`] for other extensions or
    /// unusable content, and [`BorderError::Io`] if the file is unreadable.
    pub fn from_file(path: &Path) -> Result<Self, BorderError> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("geojson" | "json") => {}
            _ => {
                return Err(BorderError::InvalidArgument(format!(
                    "{} is not a GeoJSON file",
                    path.display()
                )));
            }
        }

        let source = std::fs::read_to_string(path).map_err(|e| BorderError::Io {
            path: path.display().to_string(),
            source: e,
        })?;

        Self::from_geojson(&source)
    }

    /// All geometries in load order.
    #[must_use]
    pub fn geometries(&self) -> &[Vec<Xy>] {
        &self.geometries
    }

    /// Whether the geometry at `geometry_index` ends where it starts.
    ///
    /// Unknown or empty geometries are not closed.
    #[must_use]
    pub fn closed(&self, geometry_index: usize) -> bool {
        self.geometries
            .get(geometry_index)
            .is_some_and(|g| g.len() > 1 && g.first() == g.last())
    }

    /// Resolves a position to its point.
    #[must_use]
    pub fn xy(&self, position: Position) -> Option<Xy> {
        self.geometries
            .get(position.geometry_index)?
            .get(position.point_index)
            .copied()
    }

    /// Finds the border point closest to `xy`.
    ///
    /// Scans the geometry at `geometry_index`, or every geometry when
    /// `None`, in load order. The first point at minimal distance wins.
    #[must_use]
    pub fn nearest(&self, xy: &Xy, geometry_index: Option<usize>) -> Option<Position> {
        let mut best: Option<(f64, Position)> = None;

        for (gi, geometry) in self.geometries.iter().enumerate() {
            if geometry_index.is_some_and(|wanted| wanted != gi) {
                continue;
            }
            for (pi, point) in geometry.iter().enumerate() {
                let distance = point.distance(xy);
                if best.is_none_or(|(min, _)| distance < min) {
                    best = Some((distance, Position::new(gi, pi)));
                }
            }
        }

        best.map(|(_, position)| position)
    }

    /// Returns the points along the border from `from` to `to`, inclusive.
    ///
    /// On an open geometry the points are walked monotonically by index. On
    /// a closed geometry the shorter way around the loop is taken, the
    /// ascending direction winning a tie.
    ///
    /// # Errors
    ///
    /// Returns [`BorderError::InvalidArgument`] if the positions are on
    /// different geometries or out of range.
    pub fn segment(&self, from: Position, to: Position) -> Result<Vec<Xy>, BorderError> {
        if from.geometry_index != to.geometry_index {
            return Err(BorderError::InvalidArgument(format!(
                "positions are on different geometries ({} and {})",
                from.geometry_index, to.geometry_index
            )));
        }
        if self.xy(from).is_none() || self.xy(to).is_none() {
            return Err(BorderError::InvalidArgument(format!(
                "position out of range: {from:?} -> {to:?}"
            )));
        }

        let geometry = &self.geometries[from.geometry_index];
        let (a, b) = (from.point_index, to.point_index);

        if !self.closed(from.geometry_index) {
            return Ok(if a <= b {
                geometry[a..=b].to_vec()
            } else {
                geometry[b..=a].iter().rev().copied().collect()
            });
        }

        // The closing point repeats the first one, so the loop has one
        // point fewer than the geometry.
        let ring = geometry.len() - 1;
        let (a, b) = (a % ring, b % ring);
        let up = (b + ring - a) % ring;
        let down = (a + ring - b) % ring;

        let points = if up <= down {
            (0..=up).map(|k| geometry[(a + k) % ring]).collect()
        } else {
            (0..=down).map(|k| geometry[(a + ring - k) % ring]).collect()
        };

        Ok(points)
    }
}

fn collect_geometry(
    value: &geojson::Value,
    geometries: &mut Vec<Vec<Xy>>,
) -> Result<(), BorderError> {
    match value {
        geojson::Value::LineString(line) => geometries.push(transpose(line)?),
        geojson::Value::MultiLineString(lines) | geojson::Value::Polygon(lines) => {
            for line in lines {
                geometries.push(transpose(line)?);
            }
        }
        geojson::Value::MultiPolygon(polygons) => {
            for ring in polygons.iter().flatten() {
                geometries.push(transpose(ring)?);
            }
        }
        geojson::Value::GeometryCollection(members) => {
            for member in members {
                collect_geometry(&member.value, geometries)?;
            }
        }
        geojson::Value::Point(_) | geojson::Value::MultiPoint(_) => {
            log::debug!("Ignoring point geometry in border");
        }
    }
    Ok(())
}

fn transpose(line: &[Vec<f64>]) -> Result<Vec<Xy>, BorderError> {
    line.iter()
        .map(|coordinate| match coordinate.as_slice() {
            [long, lat, ..] => Ok(Xy::new(*lat, *long)),
            _ => Err(BorderError::InvalidArgument(format!(
                "coordinate {coordinate:?} lacks longitude and latitude"
            ))),
        })
        .collect()
}

/// Named borders of a region, keyed by file basename.
#[derive(Debug, Clone, Default)]
pub struct Borders {
    borders: BTreeMap<String, Border>,
}

impl Borders {
    /// Loads every `.geojson` file in `dir`. A missing directory yields an
    /// empty collection.
    ///
    /// # Errors
    ///
    /// Returns the first [`BorderError`] hit while loading a file.
    pub fn load_dir(dir: &Path) -> Result<Self, BorderError> {
        let mut borders = BTreeMap::new();
        if !dir.is_dir() {
            return Ok(Self { borders });
        }

        let entries = std::fs::read_dir(dir).map_err(|e| BorderError::Io {
            path: dir.display().to_string(),
            source: e,
        })?;

        for entry in entries {
            let path = entry
                .map_err(|e| BorderError::Io {
                    path: dir.display().to_string(),
                    source: e,
                })?
                .path();
            if path.extension().and_then(|e| e.to_str()) != Some("geojson") {
                continue;
            }
            let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            log::debug!("Loading border {name} from {}", path.display());
            borders.insert(name.to_string(), Border::from_file(&path)?);
        }

        Ok(Self { borders })
    }

    /// Adds or replaces a border.
    pub fn insert(&mut self, name: &str, border: Border) {
        self.borders.insert(name.to_string(), border);
    }

    /// Looks up a border by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Border> {
        self.borders.get(name)
    }

    /// Names of all loaded borders.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.borders.keys().map(String::as_str)
    }

    /// Number of loaded borders.
    #[must_use]
    pub fn len(&self) -> usize {
        self.borders.len()
    }

    /// Whether no borders are loaded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.borders.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A closed square with eight distinct points and one open line.
    fn border() -> Border {
        Border::from_array(&[
            vec![
                "0,0", "0,1", "0,2", "1,2", "2,2", "2,1", "2,0", "1,0", "0,0",
            ],
            vec!["5,0", "5,1", "5,2", "5,3"],
        ])
        .unwrap()
    }

    #[test]
    fn parses_lat_long_strings() {
        let border = Border::from_array(&[vec![" 47.5, 8.25 ", "48,9"]]).unwrap();
        assert_eq!(border.xy(Position::new(0, 0)), Some(Xy::new(47.5, 8.25)));
        assert!(Border::from_array(&[vec!["47.5"]]).is_err());
    }

    #[test]
    fn transposes_geojson_coordinates() {
        let border = Border::from_geojson(
            r#"{"type":"GeometryCollection","geometries":[
                {"type":"LineString","coordinates":[[8.0,47.0],[9.0,48.0]]},
                {"type":"Polygon","coordinates":[[[1.0,2.0],[3.0,2.0],[3.0,4.0],[1.0,2.0]]]}
            ]}"#,
        )
        .unwrap();
        assert_eq!(border.geometries().len(), 2);
        assert_eq!(border.xy(Position::new(0, 0)), Some(Xy::new(47.0, 8.0)));
        assert!(!border.closed(0));
        assert!(border.closed(1));
    }

    #[test]
    fn rejects_non_geojson_files() {
        let err = Border::from_file(Path::new("border.txt")).unwrap_err();
        assert!(matches!(err, BorderError::InvalidArgument(_)));
    }

    #[test]
    fn out_of_range_position_has_no_point() {
        let border = border();
        assert_eq!(border.xy(Position::new(0, 99)), None);
        assert_eq!(border.xy(Position::new(7, 0)), None);
    }

    #[test]
    fn closed_only_when_ends_match() {
        let border = border();
        assert!(border.closed(0));
        assert!(!border.closed(1));
        assert!(!border.closed(9));
    }

    #[test]
    fn nearest_finds_closest_point() {
        let border = border();
        let position = border.nearest(&Xy::new(4.9, 2.1), None).unwrap();
        assert_eq!(position, Position::new(1, 2));

        let target = Xy::new(4.9, 2.1);
        let best = border.xy(position).unwrap().distance(&target);
        for geometry in border.geometries() {
            for point in geometry {
                assert!(best <= point.distance(&target));
            }
        }
    }

    #[test]
    fn nearest_prefers_first_minimum() {
        let border = border();
        // (0,0) appears at index 0 and as the closing point 8.
        let position = border.nearest(&Xy::new(-0.1, -0.1), Some(0)).unwrap();
        assert_eq!(position, Position::new(0, 0));
    }

    #[test]
    fn nearest_restricted_to_geometry() {
        let border = border();
        let position = border.nearest(&Xy::new(5.0, 0.0), Some(0)).unwrap();
        assert_eq!(position.geometry_index, 0);
    }

    #[test]
    fn open_segment_walks_both_directions() {
        let border = border();
        let up = border
            .segment(Position::new(1, 1), Position::new(1, 3))
            .unwrap();
        assert_eq!(up, vec![Xy::new(5.0, 1.0), Xy::new(5.0, 2.0), Xy::new(5.0, 3.0)]);

        let down = border
            .segment(Position::new(1, 2), Position::new(1, 0))
            .unwrap();
        assert_eq!(down, vec![Xy::new(5.0, 2.0), Xy::new(5.0, 1.0), Xy::new(5.0, 0.0)]);
    }

    #[test]
    fn closed_segment_takes_shorter_way() {
        let border = border();
        // 1 -> 7 ascending is 6 steps, descending through 0 is 2 steps.
        let segment = border
            .segment(Position::new(0, 1), Position::new(0, 7))
            .unwrap();
        assert_eq!(segment, vec![Xy::new(0.0, 1.0), Xy::new(0.0, 0.0), Xy::new(1.0, 0.0)]);
    }

    #[test]
    fn closed_segment_tie_goes_ascending() {
        let border = border();
        let segment = border
            .segment(Position::new(0, 0), Position::new(0, 4))
            .unwrap();
        assert_eq!(
            segment,
            vec![
                Xy::new(0.0, 0.0),
                Xy::new(0.0, 1.0),
                Xy::new(0.0, 2.0),
                Xy::new(1.0, 2.0),
                Xy::new(2.0, 2.0),
            ]
        );
    }

    #[test]
    fn closed_segment_never_exceeds_geometry() {
        let border = border();
        let len = border.geometries()[0].len();
        for a in 0..len {
            for b in 0..len {
                let segment = border
                    .segment(Position::new(0, a), Position::new(0, b))
                    .unwrap();
                assert!(segment.len() <= len);
            }
        }
    }

    #[test]
    fn segment_rejects_mixed_geometries() {
        let err = border()
            .segment(Position::new(0, 0), Position::new(1, 0))
            .unwrap_err();
        assert!(matches!(err, BorderError::InvalidArgument(_)));
    }
}
