//! Create and manipulate a row-based [`Table`].

use color_eyre::eyre::{eyre, ContextCompat, Report, Result, WrapErr};
use color_eyre::Help;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::fmt::{Debug, Display};
use std::path::{Path, PathBuf};


/// A row-based [`Table`] of generic data.
#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct Table<T> {
    /// Names of the table columns.
    pub headers: Vec<T>,
    /// Rows of table values.
    pub rows: Vec<Vec<T>>,
    /// Optional file path for where the table was read from.
    pub path: Option<PathBuf>,
}

impl<T> Default for Table<T>
where
    T: Clone + Debug + Display + PartialEq,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Table<T>
where
    T: Clone + Debug + Display + PartialEq,
{
    /// Returns a new row-based [`Table`] with empty headers and rows.
    ///
    /// ## Examples
    ///
    /// ```
    /// let mut table = vocsample_table::Table::new();
    /// table.headers = vec!["1", "2", "3"];
    /// table.add_row(vec!["A", "B", "C"])?;
    /// # assert_eq!(table.rows, vec![vec!["A", "B", "C"]]);
    /// # Ok::<(), color_eyre::eyre::Report>(())
    /// ```
    ///
    /// | 1 | 2 | 3 |
    /// |---|---|---|
    /// | A | B | C |
    pub fn new() -> Self {
        Table { headers: Vec::new(), rows: Vec::new(), path: None }
    }

    /// Returns a new [`Table`] with the same headers and no rows.
    pub fn with_headers(headers: &[T]) -> Self {
        Table { headers: headers.to_vec(), rows: Vec::new(), path: None }
    }

    /// Number of rows in the table.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// True if the table has no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Add a new row to the table.
    ///
    /// ## Arguments
    ///
    /// * `row` - A iterable object of new data (`T`) to add as a row.
    ///
    /// ## Examples
    ///
    /// ```
    /// let mut table = vocsample_table::Table::new();
    /// table.headers = vec!["1", "2", "3"];
    /// table.add_row(["A", "B", "C"])?;
    /// table.add_row(["D", "E", "F"])?;
    /// assert!(table.add_row(["G", "H"]).is_err());
    /// # assert_eq!(table.rows, [["A", "B", "C"], ["D", "E", "F"]]);
    /// # Ok::<(), color_eyre::eyre::Report>(())
    /// ```
    pub fn add_row<I>(&mut self, row: I) -> Result<(), Report>
    where
        I: IntoIterator<Item = T>,
    {
        let row = row.into_iter().collect_vec();
        // if the table has headers, check that the new row is the correct length
        let ex = self.headers.len();
        let new = row.len();
        if !self.headers.is_empty() && ex != new {
            return Err(eyre!("New row size ({new}) does not match existing table ({ex})."));
        }
        self.rows.push(row);
        Ok(())
    }

    /// Adds a new column to the [`Table`].
    ///
    /// ## Examples
    ///
    /// ```
    /// let mut table = vocsample_table::Table::new();
    /// table.headers = vec!["1", "2", "3"];
    /// table.add_row(["A", "B", "C"])?;
    /// table.add_column("4", vec!["D"])?;
    ///
    /// assert_eq!(table.get_column("4")?, [&"D"]);
    /// # Ok::<(), color_eyre::eyre::Report>(())
    /// ```
    pub fn add_column<I>(&mut self, header: T, column: I) -> Result<(), Report>
    where
        I: IntoIterator<Item = T>,
    {
        let column = column.into_iter().collect_vec();
        let ex = self.rows.len();
        let new = column.len();

        if ex != new {
            return Err(eyre!("New column size ({new}) does not match existing table ({ex})."));
        }

        self.headers.push(header);
        self.rows.iter_mut().zip(column).for_each(|(row, val)| row.push(val));
        Ok(())
    }

    /// Returns the [`Table`] value under a particular header and row index.
    pub fn get(&self, header: &str, row: usize) -> Result<&T, Report> {
        let header_i = self.get_header_index(header)?;
        let row = self.get_row(row)?;
        Ok(&row[header_i])
    }

    /// Returns a [`Vec`] of [`Table`] values under a header.
    ///
    /// ## Examples
    ///
    /// ```
    /// let mut table = vocsample_table::Table::new();
    /// table.headers = vec!["1", "2", "3"];
    /// table.add_row(["A", "B", "C"])?;
    /// table.add_row(["D", "E", "F"])?;
    ///
    /// assert_eq!(table.get_column("1")?, [&"A", &"D"]);
    /// assert_eq!(table.get_column("3")?, [&"C", &"F"]);
    /// # Ok::<(), color_eyre::eyre::Report>(())
    /// ```
    pub fn get_column(&self, header: &str) -> Result<Vec<&T>, Report> {
        let header_i = self.get_header_index(header)?;
        let column = self.rows.iter().map(|row| &row[header_i]).collect();
        Ok(column)
    }

    /// Returns the column index (0-based) of the header in the [`Table`].
    pub fn get_header_index(&self, header: &str) -> Result<usize, Report> {
        self.headers
            .iter()
            .position(|h| h.to_string() == header)
            .ok_or_else(|| eyre!("Column '{header}' was not found in table: {:?}.", self.path))
            .with_suggestion(|| format!("Available columns: {}", self.headers.iter().join(", ")))
    }

    /// True if the header exists in the [`Table`].
    pub fn has_header(&self, header: &str) -> bool {
        self.headers.iter().any(|h| h.to_string() == header)
    }

    /// Return a row of [`Table`] values from a row index.
    pub fn get_row(&self, i: usize) -> Result<&[T], Report> {
        self.rows.get(i).map(|row| row.as_slice()).wrap_err(format!("Row ({i}) does not exist in the table."))
    }

    /// Rename a column header.
    pub fn rename_header(&mut self, from: &str, to: T) -> Result<(), Report> {
        let header_i = self.get_header_index(from)?;
        self.headers[header_i] = to;
        Ok(())
    }

    /// Returns a new [`Table`] with the rows whose value under `header` satisfies the predicate.
    ///
    /// Row order is preserved.
    ///
    /// ```
    /// let mut table = vocsample_table::Table::new();
    /// table.headers = vec!["lineage", "taxon"];
    /// table.add_row(["P.1", "a"])?;
    /// table.add_row(["B.1.1.7", "b"])?;
    /// table.add_row(["P.1", "c"])?;
    ///
    /// let filtered = table.filter("lineage", |l| *l == "P.1")?;
    /// assert_eq!(filtered.get_column("taxon")?, [&"a", &"c"]);
    /// # Ok::<(), color_eyre::eyre::Report>(())
    /// ```
    pub fn filter<F>(&self, header: &str, mut predicate: F) -> Result<Table<T>, Report>
    where
        F: FnMut(&T) -> bool,
    {
        let header_i = self.get_header_index(header)?;
        let mut table = Table::with_headers(&self.headers);
        table.rows = self.rows.iter().filter(|row| predicate(&row[header_i])).cloned().collect();
        table.path = self.path.clone();
        Ok(table)
    }

    /// Remove rows with a duplicate value under `header`, keeping the first occurrence.
    ///
    /// Returns the number of rows removed.
    ///
    /// ```
    /// let mut table = vocsample_table::Table::new();
    /// table.headers = vec!["ID", "lineage"];
    /// table.add_row(["A", "P.1"])?;
    /// table.add_row(["A", "P.2"])?;
    /// table.add_row(["B", "P.1"])?;
    ///
    /// assert_eq!(table.dedup("ID")?, 1);
    /// assert_eq!(table.get_column("lineage")?, [&"P.1", &"P.1"]);
    /// # Ok::<(), color_eyre::eyre::Report>(())
    /// ```
    pub fn dedup(&mut self, header: &str) -> Result<usize, Report> {
        let header_i = self.get_header_index(header)?;
        let before = self.rows.len();
        let mut observed = HashSet::new();
        self.rows.retain(|row| observed.insert(row[header_i].to_string()));
        Ok(before - self.rows.len())
    }

    /// Stable sort of the rows with a comparator over whole rows.
    pub fn sort_by<F>(&mut self, compare: F)
    where
        F: FnMut(&Vec<T>, &Vec<T>) -> Ordering,
    {
        self.rows.sort_by(compare);
    }

    /// Inner join of two tables on a shared key column.
    ///
    /// Output columns are this table's columns followed by the other table's
    /// columns, minus its key. Rows follow this table's order, and within one
    /// row the other table's order. Every matching pair produces one row.
    ///
    /// ```
    /// let mut left = vocsample_table::Table::new();
    /// left.headers = vec!["ID", "lineage"];
    /// left.add_row(["A", "P.1"])?;
    /// left.add_row(["B", "P.1"])?;
    ///
    /// let mut right = vocsample_table::Table::new();
    /// right.headers = vec!["ID", "SRR_ID"];
    /// right.add_row(["B", "SRR2"])?;
    /// right.add_row(["C", "SRR3"])?;
    ///
    /// let joined = left.inner_join(&right, "ID")?;
    /// assert_eq!(joined.headers, ["ID", "lineage", "SRR_ID"]);
    /// assert_eq!(joined.rows, [["B", "P.1", "SRR2"]]);
    /// # Ok::<(), color_eyre::eyre::Report>(())
    /// ```
    pub fn inner_join(&self, other: &Table<T>, key: &str) -> Result<Table<T>, Report> {
        let left_i = self.get_header_index(key)?;
        let right_i = other.get_header_index(key)?;

        // index the other table's rows by key
        let mut index: HashMap<String, Vec<usize>> = HashMap::new();
        other
            .rows
            .iter()
            .enumerate()
            .for_each(|(i, row)| index.entry(row[right_i].to_string()).or_default().push(i));

        let mut table = Table::with_headers(&self.headers);
        table.headers.extend(
            other.headers.iter().enumerate().filter(|(i, _)| *i != right_i).map(|(_, h)| h.clone()),
        );

        for row in &self.rows {
            let Some(matches) = index.get(&row[left_i].to_string()) else { continue };
            for i in matches {
                let mut joined = row.clone();
                joined.extend(
                    other.rows[*i]
                        .iter()
                        .enumerate()
                        .filter(|(col_i, _)| *col_i != right_i)
                        .map(|(_, v)| v.clone()),
                );
                table.rows.push(joined);
            }
        }

        Ok(table)
    }

    /// Append the rows of another table, aligning columns by header name.
    ///
    /// Columns only present on one side are filled with `fill`. An empty
    /// table adopts the other table's headers.
    ///
    /// ```
    /// let mut acc = vocsample_table::Table::new();
    ///
    /// let mut first = vocsample_table::Table::new();
    /// first.headers = vec!["ID", "VARIANT"];
    /// first.add_row(["A", "1"])?;
    /// acc.append(first, "");
    ///
    /// let mut second = vocsample_table::Table::new();
    /// second.headers = vec!["VARIANT", "ID", "LOWCOV"];
    /// second.add_row(["2", "B", "5"])?;
    /// acc.append(second, "");
    ///
    /// assert_eq!(acc.headers, ["ID", "VARIANT", "LOWCOV"]);
    /// assert_eq!(acc.rows, [["A", "1", ""], ["B", "2", "5"]]);
    /// # Ok::<(), color_eyre::eyre::Report>(())
    /// ```
    pub fn append(&mut self, other: Table<T>, fill: T) {
        if self.headers.is_empty() {
            self.headers = other.headers;
            self.rows.extend(other.rows);
            return;
        }

        // add columns this table has not seen yet
        for header in &other.headers {
            if !self.has_header(&header.to_string()) {
                self.headers.push(header.clone());
                self.rows.iter_mut().for_each(|row| row.push(fill.clone()));
            }
        }

        // position of each of our columns in the other table
        let positions = self
            .headers
            .iter()
            .map(|h| other.get_header_index(&h.to_string()).ok())
            .collect_vec();

        for row in other.rows {
            let aligned = positions
                .iter()
                .map(|pos| pos.map(|i| row[i].clone()).unwrap_or_else(|| fill.clone()))
                .collect_vec();
            self.rows.push(aligned);
        }
    }

    /// Write table to file.
    ///
    /// ## Arguments
    ///
    /// * `path` - Output file path.
    /// * `delim` - Optional delimiter. Otherwise, will be identified based on path suffix.
    pub fn write<P>(&self, path: &P, delim: Option<char>) -> Result<(), Report>
    where
        P: AsRef<Path> + Debug,
    {
        let delim = match delim {
            Some(c) => c,
            None => get_delimiter(path)?,
        };
        let mut writer = csv::WriterBuilder::new()
            .delimiter(delim as u8)
            .from_path(path)
            .wrap_err_with(|| format!("Unable to create file: {path:?}"))?;

        // a table without headers is written as an empty file
        if self.headers.is_empty() {
            writer.flush().wrap_err_with(|| format!("Unable to flush table: {path:?}"))?;
            return Ok(());
        }

        writer
            .write_record(self.headers.iter().map(|h| h.to_string()))
            .wrap_err_with(|| format!("Unable to write table headers: {path:?}"))?;
        for row in &self.rows {
            writer
                .write_record(row.iter().map(|v| v.to_string()))
                .wrap_err_with(|| format!("Unable to write table rows: {path:?}"))?;
        }
        writer.flush().wrap_err_with(|| format!("Unable to flush table: {path:?}"))?;

        Ok(())
    }

    /// Convert table to markdown format.
    ///
    /// ```
    /// let mut table = vocsample_table::Table::new();
    /// table.headers = vec!["1", "2", "3"];
    /// table.add_row(vec!["A", "B", "C"])?;
    /// println!("{}", table.to_markdown());
    /// # Ok::<(), color_eyre::eyre::Report>(())
    /// ```
    /// | 1 | 2 | 3 |
    /// |---|---|---|
    /// | A | B | C |
    pub fn to_markdown(&self) -> String {
        // get the maximum width of each column, +2 to add space on either side
        let col_widths = self
            .headers
            .iter()
            .enumerate()
            .map(|(col_i, header)| {
                let header_width = header.to_string().len();
                self.rows
                    .iter()
                    .map(|row| row[col_i].to_string().len().max(header_width) + 2)
                    .max()
                    .unwrap_or(header_width + 2)
            })
            .collect_vec();

        let mut markdown = String::from("|");
        // frame in between headers and rows
        let mut header_frame = String::from("|");

        for (header, col_width) in self.headers.iter().zip(col_widths.iter()) {
            markdown.push_str(&format!("{:^width$}|", header.to_string(), width = col_width));
            header_frame.push_str(&format!("{}|", "-".repeat(*col_width)));
        }
        markdown.push('\n');
        markdown.push_str(&header_frame);
        markdown.push('\n');

        for row in &self.rows {
            markdown.push('|');
            for (value, col_width) in row.iter().zip(col_widths.iter()) {
                markdown.push_str(&format!("{:^width$}|", value.to_string(), width = col_width));
            }
            markdown.push('\n');
        }

        markdown
    }
}

impl Table<String> {
    /// Read a TSV or CSV file into a [`Table`].
    ///
    /// ## Arguments
    ///
    /// * `path` - File path.
    /// * `delim` - Optional delimiter. Otherwise, will be identified based on path suffix (.tsv, .txt or .csv).
    ///
    /// A file with no content produces a table with no headers and no rows.
    pub fn read<P>(path: &P, delim: Option<char>) -> Result<Table<String>, Report>
    where
        P: AsRef<Path> + Debug,
    {
        let delim = match delim {
            Some(c) => c,
            None => get_delimiter(path)?,
        };

        let mut reader = csv::ReaderBuilder::new()
            .delimiter(delim as u8)
            .has_headers(true)
            .from_path(path)
            .wrap_err_with(|| eyre!("Failed to read file: {path:?}"))?;

        let mut table = Table::new();
        table.headers = reader
            .headers()
            .wrap_err_with(|| eyre!("Failed to read headers: {path:?}"))?
            .iter()
            .map(String::from)
            .collect();

        for (i, record) in reader.records().enumerate() {
            let record = record.wrap_err_with(|| eyre!("Failed to parse row {} of {path:?}", i + 1))?;
            table.add_row(record.iter().map(String::from))?;
        }

        table.path = Some(path.as_ref().to_path_buf());

        Ok(table)
    }
}

/// Get delimiter based on file extension.
///
/// - `.tsv` => `\t`
/// - `.txt` => `\t`
/// - `.tab` => `\t`
/// - `.csv` => `,`
///
/// Note that `.txt` is assumed to be tab-delimited!
///
/// ```rust
/// use vocsample_table::get_delimiter;
///
/// assert_eq!(get_delimiter(&"file.tsv")?, '\t');
/// assert_eq!(get_delimiter(&"file.csv")?, ',');
/// assert_eq!(get_delimiter(&"core.txt")?, '\t');
/// assert!(get_delimiter(&"file").is_err());
/// # Ok::<(), color_eyre::eyre::Report>(())
/// ```
pub fn get_delimiter<P>(path: &P) -> Result<char, Report>
where
    P: AsRef<Path> + Debug,
{
    let ext = path
        .as_ref()
        .extension()
        .wrap_err_with(|| format!("Failed to get file extension: {path:?}"))?
        .to_str()
        .wrap_err_with(|| format!("Failed to convert file extension to str: {path:?}"))?;
    match ext {
        "tsv" | "txt" | "tab" => Ok('\t'),
        "csv" => Ok(','),
        _ext => Err(eyre!("Unknown file extension: {_ext:?}").suggestion("Options: tsv, csv, tab, or txt")),
    }
}
