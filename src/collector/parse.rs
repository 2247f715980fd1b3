//! Parsing of the tabular export into scrobble records.
//!
//! The export is CSV with a header row; column order is not assumed. The
//! played-at column is accepted as unix seconds, RFC 3339, or the
//! service's "01 Jan 2020 12:00" format.

use chrono::{DateTime, NaiveDateTime};

use crate::{collector::CollectionError, domain::scrobble::ScrobbleRecord};

const DATE_COLUMNS: &[&str] = &["date", "uts", "timestamp"];
const EXPORT_DATE_FORMAT: &str = "%d %b %Y %H:%M";

pub fn parse_export(body: &str) -> Result<Vec<ScrobbleRecord>, CollectionError> {
    let mut rows = split_rows(body).into_iter();

    let header = rows
        .next()
        .ok_or_else(|| CollectionError::Parse("export is empty".to_string()))?;
    let layout = Layout::from_header(&header)?;

    let mut records = Vec::new();
    for (index, row) in rows.enumerate() {
        // header is line 1
        let line = index + 2;
        records.push(layout.record_from_row(&row, line)?);
    }
    Ok(records)
}

struct Layout {
    artist: usize,
    track: usize,
    album: Option<usize>,
    date: usize,
}

impl Layout {
    fn from_header(header: &[String]) -> Result<Self, CollectionError> {
        let find = |names: &[&str]| {
            header
                .iter()
                .position(|column| names.contains(&column.trim().to_lowercase().as_str()))
        };

        let missing =
            |name: &str| CollectionError::Parse(format!("export header has no '{name}' column"));

        Ok(Self {
            artist: find(&["artist"]).ok_or_else(|| missing("artist"))?,
            track: find(&["track"]).ok_or_else(|| missing("track"))?,
            album: find(&["album"]),
            date: find(DATE_COLUMNS).ok_or_else(|| missing("date"))?,
        })
    }

    fn record_from_row(&self, row: &[String], line: usize) -> Result<ScrobbleRecord, CollectionError> {
        let field = |index: usize| {
            row.get(index)
                .map(|value| value.trim())
                .ok_or_else(|| CollectionError::Parse(format!("line {line}: too few fields")))
        };

        let artist = field(self.artist)?;
        let track = field(self.track)?;
        if artist.is_empty() || track.is_empty() {
            return Err(CollectionError::Parse(format!(
                "line {line}: empty artist or track"
            )));
        }

        let album = match self.album {
            Some(index) => Some(field(index)?).filter(|value| !value.is_empty()),
            None => None,
        };

        let raw_date = field(self.date)?;
        let played_at = parse_timestamp(raw_date).ok_or_else(|| {
            CollectionError::Parse(format!("line {line}: unparseable date '{raw_date}'"))
        })?;

        Ok(ScrobbleRecord {
            artist: artist.to_string(),
            track: track.to_string(),
            album: album.map(|value| value.to_string()),
            played_at,
        })
    }
}

fn parse_timestamp(value: &str) -> Option<i64> {
    if let Ok(secs) = value.parse::<i64>() {
        return Some(secs);
    }
    if let Ok(datetime) = DateTime::parse_from_rfc3339(value) {
        return Some(datetime.timestamp());
    }
    NaiveDateTime::parse_from_str(value, EXPORT_DATE_FORMAT)
        .ok()
        .map(|naive| naive.and_utc().timestamp())
}

/// Minimal CSV reader: quoted fields, doubled-quote escapes, embedded
/// commas and newlines. Skips blank lines.
fn split_rows(input: &str) -> Vec<Vec<String>> {
    let mut rows = Vec::new();
    let mut row: Vec<String> = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;

    let mut chars = input.chars().peekable();
    while let Some(c) = chars.next() {
        if in_quotes {
            if c == '"' {
                if chars.peek() == Some(&'"') {
                    chars.next();
                    field.push('"');
                } else {
                    in_quotes = false;
                }
            } else {
                field.push(c);
            }
            continue;
        }

        match c {
            '"' if field.is_empty() => in_quotes = true,
            ',' => row.push(std::mem::take(&mut field)),
            '\r' => {}
            '\n' => {
                row.push(std::mem::take(&mut field));
                if !(row.len() == 1 && row[0].is_empty()) {
                    rows.push(std::mem::take(&mut row));
                } else {
                    row.clear();
                }
            }
            _ => field.push(c),
        }
    }

    if !field.is_empty() || !row.is_empty() {
        row.push(field);
        rows.push(row);
    }
    rows
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_rows() {
        let body = "artist,album,track,date\n\
                    Boards of Canada,Music Has the Right to Children,Roygbiv,1700000000\n\
                    Autechre,,Eutow,1700000100\n";

        let records = parse_export(body).unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].artist, "Boards of Canada");
        assert_eq!(
            records[0].album.as_deref(),
            Some("Music Has the Right to Children")
        );
        assert_eq!(records[0].played_at, 1_700_000_000);
        assert_eq!(records[1].album, None);
    }

    #[test]
    fn handles_quoted_fields_with_commas_and_quotes() {
        let body = "artist,album,track,date\n\
                    \"Crosby, Stills & Nash\",\"Album \"\"X\"\"\",\"Helplessly Hoping\",1700000000\n";

        let records = parse_export(body).unwrap();

        assert_eq!(records[0].artist, "Crosby, Stills & Nash");
        assert_eq!(records[0].album.as_deref(), Some("Album \"X\""));
        assert_eq!(records[0].track, "Helplessly Hoping");
    }

    #[test]
    fn accepts_columns_in_any_order() {
        let body = "date,track,artist,album\n\
                    1700000000,Roygbiv,Boards of Canada,\n";

        let records = parse_export(body).unwrap();
        assert_eq!(records[0].artist, "Boards of Canada");
        assert_eq!(records[0].track, "Roygbiv");
    }

    #[test]
    fn accepts_export_date_format() {
        let body = "artist,album,track,date\n\
                    Autechre,,Eutow,01 Jan 2020 12:00\n";

        let records = parse_export(body).unwrap();
        // 2020-01-01T12:00:00Z
        assert_eq!(records[0].played_at, 1_577_880_000);
    }

    #[test]
    fn accepts_rfc3339_dates() {
        let body = "artist,album,track,date\n\
                    Autechre,,Eutow,2020-01-01T12:00:00Z\n";

        let records = parse_export(body).unwrap();
        assert_eq!(records[0].played_at, 1_577_880_000);
    }

    #[test]
    fn rejects_missing_required_column() {
        let body = "artist,album,date\nAutechre,,1700000000\n";

        let result = parse_export(body);
        assert!(matches!(result, Err(CollectionError::Parse(_))));
    }

    #[test]
    fn rejects_unparseable_date() {
        let body = "artist,album,track,date\nAutechre,,Eutow,whenever\n";

        let result = parse_export(body);
        assert!(matches!(result, Err(CollectionError::Parse(_))));
    }

    #[test]
    fn rejects_empty_artist_or_track() {
        let body = "artist,album,track,date\n,,Eutow,1700000000\n";

        let result = parse_export(body);
        assert!(matches!(result, Err(CollectionError::Parse(_))));
    }

    #[test]
    fn skips_blank_lines() {
        let body = "artist,album,track,date\n\nAutechre,,Eutow,1700000000\n\n";

        let records = parse_export(body).unwrap();
        assert_eq!(records.len(), 1);
    }
}
