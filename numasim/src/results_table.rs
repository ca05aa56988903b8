//! Results tables.
//!
//! External engines report their results as a `thread,local,remote,time`
//! table, either as comma-separated text with a header line, or as records
//! already split into named fields (e.g. a JSON array of objects).

// Imports
use {
	crate::ThreadResult,
	anyhow::Context,
	itertools::Itertools,
	serde_json::Value,
	std::{borrow::Borrow, collections::HashMap, hash::Hash},
};

/// Columns every table must have
pub const COLUMNS: [&str; 4] = ["thread", "local", "remote", "time"];

/// Parses a comma-separated table with a header line.
///
/// Columns may appear in any order and extra columns are ignored.
/// Blank lines are skipped. Results are returned in ascending thread order.
pub fn parse_text(text: &str) -> Result<Vec<ThreadResult>, anyhow::Error> {
	let mut lines = text
		.lines()
		.map(|line| line.trim_end_matches('\r'))
		.enumerate()
		.filter(|(_, line)| !line.trim().is_empty());

	let (_, header) = lines.next().context("Table is missing its header")?;
	let header = header.split(',').map(str::trim).collect::<Vec<_>>();
	let column_idxs = COLUMNS
		.iter()
		.map(|&column| {
			header
				.iter()
				.position(|&name| name == column)
				.with_context(|| format!("Table is missing column {column:?}"))
		})
		.collect::<Result<Vec<_>, _>>()?;

	let results = lines
		.map(|(line_idx, line)| {
			let cells = line.split(',').map(str::trim).collect::<Vec<_>>();
			anyhow::ensure!(
				cells.len() == header.len(),
				"Line {} has {} cells, expected {}",
				line_idx + 1,
				cells.len(),
				header.len()
			);

			self::parse_row(|column| Some(cells[column_idxs[column]]))
				.with_context(|| format!("Unable to parse line {}", line_idx + 1))
		})
		.collect::<Result<Vec<_>, _>>()?;

	Ok(self::sorted(results))
}

/// Parses already split records.
///
/// Field names and values are trimmed, as with [`parse_text`].
pub fn parse_records<K, V>(records: impl IntoIterator<Item = HashMap<K, V>>) -> Result<Vec<ThreadResult>, anyhow::Error>
where
	K: Borrow<str> + Hash + Eq,
	V: AsRef<str>,
{
	let results = records
		.into_iter()
		.enumerate()
		.map(|(record_idx, record)| {
			self::parse_row(|column| record.get(COLUMNS[column]).map(|value| value.as_ref()))
				.with_context(|| format!("Unable to parse record {record_idx}"))
		})
		.collect::<Result<Vec<_>, _>>()?;

	Ok(self::sorted(results))
}

/// Parses a JSON array of records.
///
/// Fields may be numbers or numeric strings.
pub fn parse_json_records(text: &str) -> Result<Vec<ThreadResult>, anyhow::Error> {
	let records = serde_json::from_str::<Vec<HashMap<String, Value>>>(text).context("Records aren't a JSON array of objects")?;
	let records = records.into_iter().map(|record| {
		record
			.into_iter()
			.map(|(name, value)| match value {
				Value::String(value) => (name, value),
				value => (name, value.to_string()),
			})
			.collect::<HashMap<_, _>>()
	});

	self::parse_records(records)
}

/// Parses a single row, given a getter of each of [`COLUMNS`] by index
fn parse_row<'a>(get: impl Fn(usize) -> Option<&'a str>) -> Result<ThreadResult, anyhow::Error> {
	let field = |column: usize| -> Result<u64, anyhow::Error> {
		let name = COLUMNS[column];
		let value = get(column).with_context(|| format!("Missing field {name:?}"))?.trim();
		value
			.parse::<u64>()
			.with_context(|| format!("Field {name:?} isn't a non-negative integer: {value:?}"))
	};

	Ok(ThreadResult {
		thread: field(0)? as usize,
		local:  field(1)? as usize,
		remote: field(2)? as usize,
		time:   field(3)?,
	})
}

fn sorted(results: Vec<ThreadResult>) -> Vec<ThreadResult> {
	// Note: Engines running threads concurrently may log rows out of order
	results.into_iter().sorted_by_key(|result| result.thread).collect()
}

/// Renders results as a comma-separated table with a header line
pub fn to_text(results: &[ThreadResult]) -> String {
	let header = COLUMNS.iter().join(",");
	let rows = results
		.iter()
		.map(|result| format!("{},{},{},{}", result.thread, result.local, result.remote, result.time));

	std::iter::once(header).chain(rows).map(|line| line + "\n").collect()
}
