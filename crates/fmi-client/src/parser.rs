//! Multipoint coverage response parser
//!
//! The coverage response lists every (lat, lon, time) position in one flat
//! `positions` string and the matching value tuples in a second flat list.
//! Stations are identified by mapping each position's coordinates back to a
//! `Point` member, whose name links it to a `Location` carrying the FMISID.

use crate::error::FetchError;
use crate::observation::{BatchResult, Observation};
use chrono::DateTime;
use quick_xml::events::Event;
use quick_xml::Reader;
use std::collections::HashMap;
use std::fmt::Display;
use tracing::debug;

const NAME_CODESPACE_SUFFIX: &str = "/locationcode/name";

fn parse_err(err: impl Display) -> FetchError {
    FetchError::Parse(err.to_string())
}

/// Element whose text is currently being collected
#[derive(Debug, Clone, Copy, PartialEq)]
enum Capture {
    None,
    Identifier,
    LocationName,
    PointName,
    Pos,
    Positions,
    Values,
}

#[derive(Debug, Default)]
struct CoverageDocument {
    /// (station id, station name)
    locations: Vec<(String, String)>,
    /// (station name, "lat lon")
    points: Vec<(String, String)>,
    positions: String,
    values: String,
}

fn scan(xml: &str) -> Result<CoverageDocument, FetchError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut doc = CoverageDocument::default();
    let mut capture = Capture::None;
    let mut in_location = false;
    let mut in_point = false;
    let mut current_id = String::new();
    let mut current_name = String::new();
    let mut current_pos = String::new();

    loop {
        match reader.read_event().map_err(parse_err)? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"Location" => {
                    in_location = true;
                    current_id.clear();
                    current_name.clear();
                }
                b"Point" => {
                    in_point = true;
                    current_name.clear();
                    current_pos.clear();
                }
                b"identifier" if in_location => capture = Capture::Identifier,
                b"name" if in_location => {
                    let code_space = e.try_get_attribute("codeSpace").map_err(parse_err)?;
                    if let Some(attr) = code_space {
                        let value = attr.unescape_value().map_err(parse_err)?;
                        if value.ends_with(NAME_CODESPACE_SUFFIX) {
                            capture = Capture::LocationName;
                        }
                    }
                }
                b"name" if in_point => capture = Capture::PointName,
                b"pos" if in_point => capture = Capture::Pos,
                b"positions" => capture = Capture::Positions,
                b"doubleOrNilReasonTupleList" => capture = Capture::Values,
                _ => {}
            },
            Event::Text(t) => {
                let text = t.unescape().map_err(parse_err)?;
                match capture {
                    Capture::Identifier => current_id.push_str(text.trim()),
                    Capture::LocationName | Capture::PointName => current_name.push_str(text.trim()),
                    Capture::Pos => current_pos.push_str(text.trim()),
                    Capture::Positions => {
                        doc.positions.push_str(&text);
                        doc.positions.push(' ');
                    }
                    Capture::Values => {
                        doc.values.push_str(&text);
                        doc.values.push('\n');
                    }
                    Capture::None => {}
                }
            }
            Event::End(e) => {
                capture = Capture::None;
                match e.local_name().as_ref() {
                    b"Location" => {
                        if !current_id.is_empty() {
                            doc.locations.push((current_id.clone(), current_name.clone()));
                        }
                        in_location = false;
                    }
                    b"Point" => {
                        if !current_pos.is_empty() {
                            doc.points.push((current_name.clone(), current_pos.clone()));
                        }
                        in_point = false;
                    }
                    _ => {}
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(doc)
}

fn coordinate_key(lat: f64, lon: f64) -> String {
    format!("{:.4},{:.4}", lat, lon)
}

fn parse_f64(s: &str) -> Result<f64, FetchError> {
    s.parse::<f64>()
        .map_err(|e| FetchError::Parse(format!("invalid number {:?}: {}", s, e)))
}

fn parse_coordinates(pos: &str) -> Result<(f64, f64), FetchError> {
    let mut parts = pos.split_whitespace();
    match (parts.next(), parts.next()) {
        (Some(lat), Some(lon)) => Ok((parse_f64(lat)?, parse_f64(lon)?)),
        _ => Err(FetchError::Parse(format!("invalid pos {:?}", pos))),
    }
}

fn parse_value(s: &str) -> Result<Option<f64>, FetchError> {
    if s.eq_ignore_ascii_case("nan") {
        Ok(None)
    } else {
        parse_f64(s).map(Some)
    }
}

/// Parse a multipoint coverage document into per-station observation series.
///
/// Rows without any measurement are skipped. A document with no positions
/// (nothing observed in the window) yields an empty result.
pub fn parse_multipoint_coverage(xml: &str) -> Result<BatchResult, FetchError> {
    let doc = scan(xml)?;

    let name_to_id: HashMap<&str, &str> = doc
        .locations
        .iter()
        .map(|(id, name)| (name.as_str(), id.as_str()))
        .collect();

    let mut coord_to_station: HashMap<String, String> = HashMap::new();
    for (name, pos) in &doc.points {
        let Some(id) = name_to_id.get(name.as_str()) else {
            continue;
        };
        let (lat, lon) = parse_coordinates(pos)?;
        coord_to_station.insert(coordinate_key(lat, lon), id.to_string());
    }

    let positions: Vec<&str> = doc.positions.split_whitespace().collect();
    if positions.len() % 3 != 0 {
        return Err(FetchError::Parse(format!(
            "positions must be lat/lon/time triplets, got {} values",
            positions.len()
        )));
    }

    let rows: Vec<Vec<Option<f64>>> = doc
        .values
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| {
            line.split_whitespace()
                .map(parse_value)
                .collect::<Result<Vec<_>, _>>()
        })
        .collect::<Result<_, _>>()?;

    let position_count = positions.len() / 3;
    if position_count != rows.len() {
        return Err(FetchError::Parse(format!(
            "position count ({}) doesn't match data count ({})",
            position_count,
            rows.len()
        )));
    }

    let mut result = BatchResult::new();
    for (triplet, row) in positions.chunks(3).zip(rows) {
        let lat = parse_f64(triplet[0])?;
        let lon = parse_f64(triplet[1])?;
        let Some(station_id) = coord_to_station.get(&coordinate_key(lat, lon)) else {
            debug!("Skipping position with unknown coordinates {}, {}", lat, lon);
            continue;
        };

        let secs = triplet[2]
            .parse::<i64>()
            .map_err(|e| FetchError::Parse(format!("invalid timestamp {:?}: {}", triplet[2], e)))?;
        let timestamp = DateTime::from_timestamp(secs, 0)
            .ok_or_else(|| FetchError::Parse(format!("timestamp {} out of range", secs)))?;

        let observation = Observation {
            timestamp,
            wind_speed: row.first().copied().flatten(),
            wind_gust: row.get(1).copied().flatten(),
            wind_direction: row.get(2).copied().flatten(),
        };
        if observation.is_empty() {
            continue;
        }

        result.entry(station_id.clone()).or_default().push(observation);
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<wfs:FeatureCollection xmlns:wfs="http://www.opengis.net/wfs/2.0" xmlns:gml="http://www.opengis.net/gml/3.2" xmlns:gmlcov="http://www.opengis.net/gmlcov/1.0" xmlns:target="http://xml.fmi.fi/namespace/om/atmosphericfeatures/1.1" xmlns:sams="http://www.opengis.net/samplingSpatial/2.0" xmlns:sam="http://www.opengis.net/sampling/2.0" xmlns:omso="http://inspire.ec.europa.eu/schemas/omso/3.0" numberReturned="1">
  <wfs:member>
    <omso:GridSeriesObservation gml:id="obs-obs-1-1">
      <om:featureOfInterest xmlns:om="http://www.opengis.net/om/2.0">
        <sams:SF_SpatialSamplingFeature gml:id="sampling-feature-1-1-fmisid">
          <sam:sampledFeature>
            <target:LocationCollection gml:id="sampled-target-1-1">
              <target:member>
                <target:Location gml:id="obsloc-fmisid-100996-pos">
                  <gml:identifier codeSpace="http://xml.fmi.fi/namespace/stationcode/fmisid">100996</gml:identifier>
                  <gml:name codeSpace="http://xml.fmi.fi/namespace/locationcode/name">Helsinki Harmaja</gml:name>
                  <gml:name codeSpace="http://xml.fmi.fi/namespace/locationcode/wmo">2795</gml:name>
                </target:Location>
              </target:member>
              <target:member>
                <target:Location gml:id="obsloc-fmisid-101023-pos">
                  <gml:identifier codeSpace="http://xml.fmi.fi/namespace/stationcode/fmisid">101023</gml:identifier>
                  <gml:name codeSpace="http://xml.fmi.fi/namespace/locationcode/name">Porvoo Emäsalo</gml:name>
                </target:Location>
              </target:member>
            </target:LocationCollection>
          </sam:sampledFeature>
          <sams:shape>
            <gml:MultiPoint gml:id="mp-1-1-fmisid">
              <gml:pointMember>
                <gml:Point gml:id="point-100996" srsName="http://www.opengis.net/def/crs/EPSG/0/4258" srsDimension="2">
                  <gml:name>Helsinki Harmaja</gml:name>
                  <gml:pos>60.10512 24.97539 </gml:pos>
                </gml:Point>
              </gml:pointMember>
              <gml:pointMember>
                <gml:Point gml:id="point-101023" srsName="http://www.opengis.net/def/crs/EPSG/0/4258" srsDimension="2">
                  <gml:name>Porvoo Emäsalo</gml:name>
                  <gml:pos>60.20382 25.62546 </gml:pos>
                </gml:Point>
              </gml:pointMember>
            </gml:MultiPoint>
          </sams:shape>
        </sams:SF_SpatialSamplingFeature>
      </om:featureOfInterest>
      <om:result xmlns:om="http://www.opengis.net/om/2.0">
        <gmlcov:MultiPointCoverage gml:id="mpcv-1-1-fmisid">
          <gml:domainSet>
            <gmlcov:SimpleMultiPoint gml:id="mp-1-1-fmisid" srsDimension="3">
              <gmlcov:positions>
                60.10512 24.97539  1700000000
                60.10512 24.97539  1700000600
                60.20382 25.62546  1700000000
                60.20382 25.62546  1700000600
              </gmlcov:positions>
            </gmlcov:SimpleMultiPoint>
          </gml:domainSet>
          <gml:rangeSet>
            <gml:DataBlock>
              <gml:rangeParameters/>
              <gml:doubleOrNilReasonTupleList>
                5.2 7.1 210.0
                5.6 NaN 215.0
                NaN NaN NaN
                3.1 4.0 180.0
              </gml:doubleOrNilReasonTupleList>
            </gml:DataBlock>
          </gml:rangeSet>
        </gmlcov:MultiPointCoverage>
      </om:result>
    </omso:GridSeriesObservation>
  </wfs:member>
</wfs:FeatureCollection>"#;

    #[test]
    fn test_parse_sample() {
        let result = parse_multipoint_coverage(SAMPLE).unwrap();

        let harmaja = &result["100996"];
        assert_eq!(harmaja.len(), 2);
        assert_eq!(harmaja[0].timestamp.timestamp(), 1_700_000_000);
        assert_eq!(harmaja[0].wind_speed, Some(5.2));
        assert_eq!(harmaja[1].wind_gust, None);
        assert_eq!(harmaja[1].wind_direction, Some(215.0));

        // Empty row is skipped rather than reported as zero wind
        let emasalo = &result["101023"];
        assert_eq!(emasalo.len(), 1);
        assert_eq!(emasalo[0].timestamp.timestamp(), 1_700_000_600);
    }

    #[test]
    fn test_empty_collection_is_empty_result() {
        let xml = r#"<wfs:FeatureCollection xmlns:wfs="http://www.opengis.net/wfs/2.0" numberReturned="0"></wfs:FeatureCollection>"#;
        let result = parse_multipoint_coverage(xml).unwrap();
        assert!(result.is_empty());
    }

    #[test]
    fn test_count_mismatch_is_error() {
        let broken = SAMPLE.replace("3.1 4.0 180.0", "");
        assert!(matches!(
            parse_multipoint_coverage(&broken),
            Err(FetchError::Parse(_))
        ));
    }

    #[test]
    fn test_malformed_xml_is_error() {
        assert!(parse_multipoint_coverage("<a><b></a>").is_err());
    }
}
