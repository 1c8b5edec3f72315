//! Delimited record codec for bulk job data.
//!
//! Decoding is lazy: rows are read from the source only as the consumer pulls
//! them. Result sets downloaded over HTTP are decoded on a blocking thread and
//! handed over through a bounded channel as a [`RecordStream`].

use super::types::{ColumnDelimiter, Fields, LineEnding, UnprocessedRecord};
use super::Error;
use futures_util::{Stream, TryStreamExt};
use serde_json::Value;
use std::io::{self, Read};
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::io::{StreamReader, SyncIoBridge};

/// Value written in place of missing or null fields when a record asks for it.
pub const NULL_VALUE: &str = "#N/A";

/// Rows buffered between the decoding thread and the consumer.
const RECORD_CHANNEL_CAPACITY: usize = 256;

/// A record that can be encoded as one row of job data.
pub trait Record {
    /// Field values keyed by column name.
    fn fields(&self) -> &Fields;

    /// Whether missing and null values are written as [`NULL_VALUE`].
    ///
    /// Bulk 2.0 leaves a field untouched when its cell is empty, so clearing a
    /// field requires the explicit marker.
    fn insert_null(&self) -> bool {
        false
    }
}

impl Record for Fields {
    fn fields(&self) -> &Fields {
        self
    }
}

impl Record for UnprocessedRecord {
    fn fields(&self) -> &Fields {
        &self.fields
    }
}

/// Encodes records into delimited text with a leading header row.
///
/// # Examples
///
/// ```
/// use salesforce_bulk::bulkapi::{ColumnDelimiter, Fields, Formatter, LineEnding};
/// use serde_json::json;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let mut formatter = Formatter::new(
///     ColumnDelimiter::Pipe,
///     LineEnding::Linefeed,
///     vec!["Name".to_string(), "Site".to_string()],
/// )?;
///
/// let mut record = Fields::new();
/// record.insert("Name".to_string(), json!("name 1"));
/// record.insert("Site".to_string(), json!("good site"));
/// formatter.add(&[record])?;
///
/// assert_eq!(formatter.finish()?, b"Name|Site\nname 1|good site\n");
/// # Ok(())
/// # }
/// ```
pub struct Formatter {
    fields: Vec<String>,
    writer: csv::Writer<Vec<u8>>,
}

impl Formatter {
    /// Creates a formatter and writes the header row.
    pub fn new(
        delimiter: ColumnDelimiter,
        line_ending: LineEnding,
        fields: Vec<String>,
    ) -> Result<Self, Error> {
        if fields.is_empty() {
            return Err(Error::EmptyFields);
        }

        let mut writer = csv::WriterBuilder::new()
            .delimiter(delimiter.as_byte())
            .terminator(line_ending.terminator())
            .quote_style(csv::QuoteStyle::Necessary)
            .from_writer(Vec::new());
        writer
            .write_record(&fields)
            .map_err(|source| Error::Csv {
                phase: "encoding records",
                source,
            })?;

        Ok(Self { fields, writer })
    }

    /// The header row, in column order.
    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    /// Appends one row per record, in header column order.
    pub fn add<R: Record>(&mut self, records: &[R]) -> Result<(), Error> {
        if records.is_empty() {
            return Err(Error::EmptyRecords);
        }

        for record in records {
            let values = record.fields();
            let row = self
                .fields
                .iter()
                .map(|field| render(values.get(field), record.insert_null()));
            self.writer
                .write_record(row)
                .map_err(|source| Error::Csv {
                    phase: "encoding records",
                    source,
                })?;
        }
        Ok(())
    }

    /// Flushes and returns the encoded bytes.
    pub fn finish(self) -> Result<Vec<u8>, Error> {
        self.writer.into_inner().map_err(|err| Error::Csv {
            phase: "encoding records",
            source: csv::Error::from(err.into_error()),
        })
    }
}

/// Encodes records in one call.
pub fn encode<R: Record>(
    delimiter: ColumnDelimiter,
    line_ending: LineEnding,
    fields: Vec<String>,
    records: &[R],
) -> Result<Vec<u8>, Error> {
    let mut formatter = Formatter::new(delimiter, line_ending, fields)?;
    formatter.add(records)?;
    formatter.finish()
}

fn render(value: Option<&Value>, insert_null: bool) -> String {
    match value {
        None | Some(Value::Null) if insert_null => NULL_VALUE.to_string(),
        None | Some(Value::Null) => String::new(),
        Some(Value::String(text)) => text.clone(),
        Some(other) => other.to_string(),
    }
}

/// Column names of a decoded result set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Header {
    columns: Vec<String>,
}

impl Header {
    /// Column names in order.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Position of a column, matched by exact name.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|column| column == name)
    }

    pub(crate) fn require(&self, column: &'static str) -> Result<usize, Error> {
        self.position(column).ok_or(Error::MissingColumn { column })
    }

    /// Builds the field map of a row, leaving out the `skip` positions.
    pub fn fields(&self, row: &csv::StringRecord, skip: &[usize]) -> Fields {
        self.columns
            .iter()
            .zip(row.iter())
            .enumerate()
            .filter(|(idx, _)| !skip.contains(idx))
            .map(|(_, (column, value))| (column.clone(), Value::String(value.to_string())))
            .collect()
    }
}

/// Lazily decodes delimited rows from a reader.
///
/// The first row is the header. Every following row must have as many
/// columns as the header. Quotes inside unquoted fields are kept literally.
pub struct RecordReader<R> {
    header: Header,
    reader: csv::Reader<R>,
}

impl<R: Read> RecordReader<R> {
    /// Reads the header row and prepares to iterate data rows.
    ///
    /// An empty source yields an empty header and no rows.
    pub fn new(source: R, delimiter: ColumnDelimiter) -> Result<Self, Error> {
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(delimiter.as_byte())
            .has_headers(true)
            .from_reader(source);
        let columns = reader
            .headers()
            .map_err(|source| Error::Csv {
                phase: "decoding records",
                source,
            })?
            .iter()
            .map(str::to_string)
            .collect();

        Ok(Self {
            header: Header { columns },
            reader,
        })
    }

    pub fn header(&self) -> &Header {
        &self.header
    }
}

impl<R: Read> Iterator for RecordReader<R> {
    type Item = Result<csv::StringRecord, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut row = csv::StringRecord::new();
        match self.reader.read_record(&mut row) {
            Ok(true) => Some(Ok(row)),
            Ok(false) => None,
            Err(source) => Some(Err(Error::Csv {
                phase: "decoding records",
                source,
            })),
        }
    }
}

/// Decodes every row of an in-memory result set.
pub fn decode<T, F>(data: &[u8], delimiter: ColumnDelimiter, mut shape: F) -> Result<Vec<T>, Error>
where
    F: FnMut(&Header, &csv::StringRecord) -> Result<T, Error>,
{
    let mut records = RecordReader::new(data, delimiter)?;
    let header = records.header().clone();
    records
        .by_ref()
        .map(|row| row.and_then(|row| shape(&header, &row)))
        .collect()
}

/// Decoded records of a downloaded result set, in server order.
///
/// The download is read only as fast as records are consumed. Dropping the
/// stream stops decoding and releases the connection. A decoding error is
/// yielded once and ends the stream.
pub struct RecordStream<T> {
    inner: ReceiverStream<Result<T, Error>>,
}

impl<T> RecordStream<T> {
    /// Collects the remaining records, stopping at the first error.
    pub async fn collect_all(self) -> Result<Vec<T>, Error> {
        self.try_collect().await
    }
}

impl<T> Stream for RecordStream<T> {
    type Item = Result<T, Error>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

/// Decodes a response body on a blocking thread.
///
/// Must be called from within a Tokio runtime.
pub(crate) fn decode_response<T, F>(
    response: reqwest::Response,
    delimiter: ColumnDelimiter,
    mut shape: F,
) -> RecordStream<T>
where
    T: Send + 'static,
    F: FnMut(&Header, &csv::StringRecord) -> Result<T, Error> + Send + 'static,
{
    let (tx, rx) = mpsc::channel(RECORD_CHANNEL_CAPACITY);
    let body = Box::pin(response.bytes_stream().map_err(io::Error::other));
    let source = SyncIoBridge::new(StreamReader::new(body));

    tokio::task::spawn_blocking(move || {
        let mut records = match RecordReader::new(source, delimiter) {
            Ok(records) => records,
            Err(err) => {
                let _ = tx.blocking_send(Err(err));
                return;
            }
        };
        let header = records.header().clone();
        for row in records.by_ref() {
            let item = row.and_then(|row| shape(&header, &row));
            let stop = item.is_err();
            if tx.blocking_send(item).is_err() || stop {
                return;
            }
        }
    });

    RecordStream {
        inner: ReceiverStream::new(rx),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(pairs: &[(&str, Value)]) -> Fields {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    struct NullableRecord(Fields);

    impl Record for NullableRecord {
        fn fields(&self) -> &Fields {
            &self.0
        }

        fn insert_null(&self) -> bool {
            true
        }
    }

    #[test]
    fn test_encode_with_pipe_delimiter() {
        let records = vec![
            fields(&[("Name", json!("name 1")), ("Site", json!("good site"))]),
            fields(&[("Name", json!("name 2")), ("Site", json!("great site"))]),
        ];
        let data = encode(
            ColumnDelimiter::Pipe,
            LineEnding::Linefeed,
            vec!["Name".to_string(), "Site".to_string()],
            &records,
        )
        .unwrap();
        assert_eq!(
            String::from_utf8(data).unwrap(),
            "Name|Site\nname 1|good site\nname 2|great site\n"
        );
    }

    #[test]
    fn test_encode_crlf_and_quoting() {
        let records = vec![fields(&[
            ("Name", json!("Acme, Inc")),
            ("Employees", json!(12)),
            ("Active", json!(true)),
        ])];
        let data = encode(
            ColumnDelimiter::Comma,
            LineEnding::CarriageReturnLinefeed,
            vec!["Name".into(), "Employees".into(), "Active".into()],
            &records,
        )
        .unwrap();
        assert_eq!(
            String::from_utf8(data).unwrap(),
            "Name,Employees,Active\r\n\"Acme, Inc\",12,true\r\n"
        );
    }

    #[test]
    fn test_encode_missing_and_null_values() {
        let record = fields(&[("Name", json!("Acme")), ("Site", Value::Null)]);
        let header = vec!["Name".to_string(), "Site".to_string(), "Phone".to_string()];

        let plain = encode(ColumnDelimiter::Comma, LineEnding::Linefeed, header.clone(), &[record.clone()])
            .unwrap();
        assert_eq!(String::from_utf8(plain).unwrap(), "Name,Site,Phone\nAcme,,\n");

        let nullable = encode(
            ColumnDelimiter::Comma,
            LineEnding::Linefeed,
            header,
            &[NullableRecord(record)],
        )
        .unwrap();
        assert_eq!(
            String::from_utf8(nullable).unwrap(),
            "Name,Site,Phone\nAcme,#N/A,#N/A\n"
        );
    }

    #[test]
    fn test_encode_requires_fields_and_records() {
        assert!(matches!(
            Formatter::new(ColumnDelimiter::Comma, LineEnding::Linefeed, Vec::new()),
            Err(Error::EmptyFields)
        ));

        let mut formatter =
            Formatter::new(ColumnDelimiter::Comma, LineEnding::Linefeed, vec!["Name".into()])
                .unwrap();
        let none: &[Fields] = &[];
        assert!(matches!(formatter.add(none), Err(Error::EmptyRecords)));
    }

    #[test]
    fn test_decode_rows_in_order() {
        let data = b"Id|Name\n001|Acme\n002|\"Globex|Corp\"\n";
        let rows = decode(data, ColumnDelimiter::Pipe, |header, row| {
            Ok(header.fields(row, &[]))
        })
        .unwrap();
        assert_eq!(
            rows,
            vec![
                fields(&[("Id", json!("001")), ("Name", json!("Acme"))]),
                fields(&[("Id", json!("002")), ("Name", json!("Globex|Corp"))]),
            ]
        );
    }

    #[test]
    fn test_decode_lenient_quotes_and_crlf() {
        let data = b"Name,Note\r\nAcme,say \"hi\"\r\n";
        let rows = decode(data, ColumnDelimiter::Comma, |header, row| {
            Ok(header.fields(row, &[]))
        })
        .unwrap();
        assert_eq!(rows[0].get("Note"), Some(&json!("say \"hi\"")));
    }

    #[test]
    fn test_decode_skips_columns_by_position() {
        let data = b"sf__Id,sf__Error,Name\n001,BAD,Acme\n";
        let rows = decode(data, ColumnDelimiter::Comma, |header, row| {
            let skip = [header.require("sf__Id")?, header.require("sf__Error")?];
            Ok(header.fields(row, &skip))
        })
        .unwrap();
        assert_eq!(rows, vec![fields(&[("Name", json!("Acme"))])]);
    }

    #[test]
    fn test_decode_missing_column() {
        let data = b"Name\nAcme\n";
        let result = decode(data, ColumnDelimiter::Comma, |header, _| {
            header.require("sf__Created")
        });
        assert!(matches!(
            result,
            Err(Error::MissingColumn {
                column: "sf__Created"
            })
        ));
    }

    #[test]
    fn test_decode_ragged_row_is_an_error() {
        let data = b"Id,Name\n001\n";
        let result = decode(data, ColumnDelimiter::Comma, |header, row| {
            Ok(header.fields(row, &[]))
        });
        assert!(matches!(result, Err(Error::Csv { .. })));
    }

    #[test]
    fn test_decode_empty_input() {
        let rows = decode(b"", ColumnDelimiter::Comma, |header, row| {
            Ok(header.fields(row, &[]))
        })
        .unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn test_encoded_records_decode_unchanged() {
        let records = vec![
            fields(&[("Name", json!("Acme")), ("Site", json!("north"))]),
            fields(&[("Name", json!("Globex")), ("Site", json!(""))]),
        ];
        let data = encode(
            ColumnDelimiter::Caret,
            LineEnding::CarriageReturnLinefeed,
            vec!["Name".to_string(), "Site".to_string()],
            &records,
        )
        .unwrap();
        let decoded = decode(&data, ColumnDelimiter::Caret, |header, row| {
            Ok(header.fields(row, &[]))
        })
        .unwrap();
        assert_eq!(decoded, records);
    }

    #[test]
    fn test_reader_is_lazy() {
        let data: &[u8] = b"Name\nA\nB\nC\n";
        let mut reader = RecordReader::new(data, ColumnDelimiter::Comma).unwrap();
        assert_eq!(reader.header().columns(), ["Name".to_string()]);
        let first = reader.next().unwrap().unwrap();
        assert_eq!(&first[0], "A");
        assert_eq!(reader.count(), 2);
    }
}
