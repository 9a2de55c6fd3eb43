use chrono::NaiveDateTime;
use exif::{In, Rational, Reader, Tag, Value};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("could not open file: {0}")]
    Io(#[from] std::io::Error),

    #[error("could not decode metadata: {0}")]
    Exif(#[from] exif::Error),
}

/// What a readable image yielded. A missing GPS tag is not an error, it is
/// the `Unlocated` outcome; the capture timestamp is optional in both cases.
#[derive(Debug, Clone, PartialEq)]
pub enum Extraction {
    Located {
        coordinates: (f64, f64),
        captured_at: Option<NaiveDateTime>,
    },
    Unlocated {
        captured_at: Option<NaiveDateTime>,
    },
}

/// Reads the embedded metadata of one image file. Never touches pixel data.
pub fn extract(path: &Path) -> Result<Extraction, ExtractError> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);
    let exif = Reader::new().read_from_container(&mut reader)?;

    let captured_at = capture_timestamp(&exif);
    let latitude = gps_coordinate(&exif, Tag::GPSLatitude, Tag::GPSLatitudeRef);
    let longitude = gps_coordinate(&exif, Tag::GPSLongitude, Tag::GPSLongitudeRef);

    match (latitude, longitude) {
        (Some(lat), Some(lon)) => {
            log::trace!("GPS position for {:?}: ({}, {})", path, lat, lon);
            Ok(Extraction::Located {
                coordinates: (lat, lon),
                captured_at,
            })
        }
        _ => {
            log::debug!("No GPS position in {:?}", path);
            Ok(Extraction::Unlocated { captured_at })
        }
    }
}

/// Reads one GPS coordinate pair of tags and converts it to signed decimal
/// degrees. Requires the degrees/minutes/seconds triplet plus the hemisphere
/// reference tag; anything else counts as "no position".
fn gps_coordinate(exif: &exif::Exif, value_tag: Tag, ref_tag: Tag) -> Option<f64> {
    let value_field = exif.get_field(value_tag, In::PRIMARY)?;
    let ref_field = exif.get_field(ref_tag, In::PRIMARY)?;

    let dms = match value_field.value {
        Value::Rational(ref dms) if dms.len() == 3 => dms,
        _ => return None,
    };
    let hemisphere = match ref_field.value {
        Value::Ascii(ref lines) => lines.first().and_then(|l| l.first()).map(|b| *b as char)?,
        _ => return None,
    };

    Some(signed_degrees(dms, hemisphere))
}

fn signed_degrees(dms: &[Rational], hemisphere: char) -> f64 {
    let decimal = dms[0].to_f64() + dms[1].to_f64() / 60.0 + dms[2].to_f64() / 3600.0;
    match hemisphere {
        'S' | 'W' => -decimal,
        _ => decimal,
    }
}

/// Capture time from `DateTimeOriginal`, falling back to `DateTime`. The
/// value is camera-local; no timezone conversion is attempted.
fn capture_timestamp(exif: &exif::Exif) -> Option<NaiveDateTime> {
    for tag in [Tag::DateTimeOriginal, Tag::DateTime] {
        let field = match exif.get_field(tag, In::PRIMARY) {
            Some(field) => field,
            None => continue,
        };
        if let Value::Ascii(ref lines) = field.value {
            if let Some(parsed) = lines
                .first()
                .and_then(|raw| std::str::from_utf8(raw).ok())
                .and_then(|s| parse_exif_datetime(s.trim()))
            {
                return Some(parsed);
            }
        }
    }
    None
}

fn parse_exif_datetime(s: &str) -> Option<NaiveDateTime> {
    for fmt in ["%Y:%m:%d %H:%M:%S", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt);
        }
    }
    None
}
