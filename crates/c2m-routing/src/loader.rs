//! Static route files
//!
//! CSV rows are `<can id>,<codec>,<topic>` with a decimal CAN ID, no header and
//! no quoting; every CSV route is bidirectional. JSON files use the same
//! array-of-routes format as the route-update topic.
//!
//! Bad rows are skipped with a warning, never fatal.

use std::collections::HashSet;
use std::io::Read;
use std::path::Path;

use tracing::{info, warn};

use c2m_conv::{CodecRegistry, CAN_EFF_MASK};

use crate::error::{RoutingError, RoutingResult};
use crate::route::Route;
use crate::updater::retain_known_codecs;

/// Read routes from CSV
///
/// Rows with a malformed ID, a duplicate ID, a duplicate topic or an unknown
/// codec are skipped. Only I/O failures are returned as errors.
pub fn load_csv<R: Read>(reader: R, registry: &CodecRegistry) -> RoutingResult<Vec<Route>> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut ids = HashSet::new();
    let mut topics = HashSet::new();
    let mut routes = Vec::new();

    for record in rdr.records() {
        let record = match record {
            Ok(record) => record,
            Err(e) if e.is_io_error() => return Err(e.into()),
            Err(e) => {
                warn!(error = %e, "Skipping line");
                continue;
            }
        };
        let line = record.position().map(|p| p.line()).unwrap_or_default();

        if record.len() != 3 {
            warn!(line, fields = record.len(), "Skipping line, expected 3 fields");
            continue;
        }
        let (id, codec, topic) = (&record[0], &record[1], &record[2]);

        let can_id = match id.parse::<u32>() {
            Ok(can_id) if can_id <= CAN_EFF_MASK => can_id,
            _ => {
                warn!(line, id, "Skipping line, malformed CAN ID");
                continue;
            }
        };
        if topic.is_empty() {
            warn!(line, "Skipping line, empty topic");
            continue;
        }
        if ids.contains(&can_id) {
            warn!(line, can_id, "Skipping line, duplicate ID");
            continue;
        }
        if topics.contains(topic) {
            warn!(line, topic, "Skipping line, duplicate topic");
            continue;
        }
        if !registry.contains(codec) {
            warn!(line, codec, "Skipping line, unknown codec");
            continue;
        }

        ids.insert(can_id);
        topics.insert(topic.to_string());

        routes.push(Route::new(can_id.to_string(), topic).with_codec(codec));
    }

    Ok(routes)
}

/// Read routes from a JSON array
pub fn load_json<R: Read>(reader: R, registry: &CodecRegistry) -> RoutingResult<Vec<Route>> {
    let routes: Vec<Route> = serde_json::from_reader(reader)?;
    Ok(retain_known_codecs(routes, registry))
}

/// Read a route file, picking the format from its extension
pub fn load_routes_file(
    path: impl AsRef<Path>,
    registry: &CodecRegistry,
) -> RoutingResult<Vec<Route>> {
    let path = path.as_ref();
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);

    let routes = match ext.as_deref() {
        Some("csv") => load_csv(std::fs::File::open(path)?, registry)?,
        Some("json") => load_json(std::fs::File::open(path)?, registry)?,
        _ => return Err(RoutingError::UnsupportedFormat(path.display().to_string())),
    };

    info!(path = %path.display(), routes = routes.len(), "Loaded route file");
    Ok(routes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::route::Direction;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[test]
    fn test_load_csv() {
        let csv = "100,none,home/raw\n101,uint82ascii,home/level\n";
        let routes = load_csv(csv.as_bytes(), &CodecRegistry::new()).unwrap();
        assert_eq!(
            routes,
            vec![
                Route::new("100", "home/raw").with_codec("none"),
                Route::new("101", "home/level").with_codec("uint82ascii"),
            ]
        );
        assert!(routes.iter().all(|r| r.direction == Direction::Bidirectional));
    }

    #[test]
    fn test_malformed_id_skipped() {
        let csv = "abc,none,topic\n200,none,other\n";
        let routes = load_csv(csv.as_bytes(), &CodecRegistry::new()).unwrap();
        assert_eq!(routes, vec![Route::new("200", "other").with_codec("none")]);
    }

    #[test]
    fn test_bad_rows_skipped() {
        let csv = "\
1,none,a
1,none,b
2,none,a
3,mymode,c
4,none
3,none,c
5,16bool2ascii,e
-1,none,f
536870912,none,g
";
        let routes = load_csv(csv.as_bytes(), &CodecRegistry::new()).unwrap();
        assert_eq!(
            routes,
            vec![
                Route::new("1", "a").with_codec("none"),
                Route::new("3", "c").with_codec("none"),
                Route::new("5", "e").with_codec("16bool2ascii"),
            ]
        );
    }

    #[test]
    fn test_load_json() {
        let json = r#"[
            {"canid":"0x100","topic":"a","direction":1,"converter":"bytecolor2colorcode"},
            {"canid":"2","topic":"b","converter":"nope"}
        ]"#;
        let routes = load_json(json.as_bytes(), &CodecRegistry::new()).unwrap();
        assert_eq!(
            routes,
            vec![Route::new("0x100", "a")
                .with_direction(Direction::MqttToCan)
                .with_codec("bytecolor2colorcode")]
        );
    }

    #[test]
    fn test_load_json_invalid() {
        assert!(load_json("{".as_bytes(), &CodecRegistry::new()).is_err());
    }

    #[test]
    fn test_load_routes_file() {
        let registry = CodecRegistry::new();

        let mut csv = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        writeln!(csv, "291,uint162ascii,car/speed").unwrap();
        let routes = load_routes_file(csv.path(), &registry).unwrap();
        assert_eq!(routes[0].id().unwrap(), 291);

        let mut json = tempfile::Builder::new().suffix(".JSON").tempfile().unwrap();
        write!(json, r#"[{{"canid":"7","topic":"x"}}]"#).unwrap();
        let routes = load_routes_file(json.path(), &registry).unwrap();
        assert_eq!(routes, vec![Route::new("7", "x")]);

        let other = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        assert!(matches!(
            load_routes_file(other.path(), &registry),
            Err(RoutingError::UnsupportedFormat(_))
        ));

        assert!(matches!(
            load_routes_file("/nonexistent/routes.csv", &registry),
            Err(RoutingError::Io(_))
        ));
    }

    #[test]
    fn test_shipped_route_files_agree() {
        let registry = CodecRegistry::new();
        let csv = load_csv(include_str!("../../../config/routes.csv").as_bytes(), &registry).unwrap();
        let json = load_json(include_str!("../../../config/routes.json").as_bytes(), &registry).unwrap();
        assert_eq!(csv.len(), 7);
        assert_eq!(json.len(), 7);

        for (c, j) in csv.iter().zip(&json) {
            assert_eq!(c.id().unwrap(), j.id().unwrap());
            assert_eq!(c.topic, j.topic);
            assert_eq!(c.codec_name(), j.codec_name());
        }

        let (table, rejected) = crate::RoutingTable::with_routes(json);
        assert!(rejected.is_empty());
        assert_eq!(table.len(), 7);
    }
}
