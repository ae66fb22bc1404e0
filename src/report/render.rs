//! Plain-text table layout.

use unicode_width::UnicodeWidthStr;

use super::format::{printable, Cell, Painter, Style};
use super::schema::{Column, Justify};

/// A table with multi-line headers and a simple box: a rule under the
/// header, no vertical borders, columns separated by padding.
pub struct Table {
    columns: Vec<Column>,
    rows: Vec<Vec<Cell>>,
}

impl Table {
    pub fn new(columns: &[Column]) -> Self {
        Self {
            columns: columns.to_vec(),
            rows: Vec::new(),
        }
    }

    /// Add a row; missing trailing cells render empty.
    pub fn add_row(&mut self, cells: Vec<Cell>) {
        let mut cells: Vec<Cell> = cells
            .into_iter()
            .zip(&self.columns)
            .map(|(cell, column)| match column.max_width {
                Some(max) => cell.truncate(max),
                None => cell,
            })
            .collect();
        cells.resize(self.columns.len(), Cell::empty());
        self.rows.push(cells);
    }

    #[cfg(test)]
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    fn widths(&self) -> Vec<usize> {
        self.columns
            .iter()
            .enumerate()
            .map(|(i, column)| {
                let header = column.header.iter().map(|l| l.width()).max().unwrap_or(0);
                let body = self.rows.iter().map(|r| r[i].width()).max().unwrap_or(0);
                header.max(body)
            })
            .collect()
    }

    pub fn render(&self, painter: &Painter) -> String {
        let widths = self.widths();
        let mut lines = vec![String::new()];

        let header_height = self.columns.iter().map(|c| c.header.len()).max().unwrap_or(0);
        for line in 0..header_height {
            let cells = self.columns.iter().zip(&widths).map(|(column, width)| {
                let text = column.header.get(line).copied().unwrap_or("");
                let cell = Cell::plain(text);
                pad(&cell, *width, column.justify, painter, Some(Style::Bold))
            });
            lines.push(join(cells));
        }

        let total: usize = widths.iter().sum::<usize>() + 2 * widths.len();
        lines.push("─".repeat(total));

        for row in &self.rows {
            let cells = self
                .columns
                .iter()
                .zip(&widths)
                .zip(row)
                .map(|((column, width), cell)| pad(cell, *width, column.justify, painter, column.style));
            lines.push(join(cells));
        }

        lines.push(String::new());
        let mut out = lines.join("\n");
        out.push('\n');
        out
    }
}

fn pad(cell: &Cell, width: usize, justify: Justify, painter: &Painter, style: Option<Style>) -> String {
    let fill = width.saturating_sub(cell.width());
    let (left, right) = match justify {
        Justify::Left => (0, fill),
        Justify::Right => (fill, 0),
        Justify::Center => (fill / 2, fill - fill / 2),
    };
    format!(
        "{}{}{}",
        " ".repeat(left),
        cell.paint(painter, style),
        " ".repeat(right)
    )
}

fn join(cells: impl Iterator<Item = String>) -> String {
    let line = format!(" {}", cells.collect::<Vec<_>>().join("  "));
    line.trim_end().to_string()
}

/// Two-column label/value grid with bold labels.
pub fn grid(rows: &[(String, String)], painter: &Painter) -> String {
    rows.iter()
        .map(|(label, value)| {
            format!("{}{}\n", painter.paint(label, Some(Style::Bold)), printable(value))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::schema::ColumnKey;

    fn plain_lines(table: &Table) -> Vec<String> {
        table.render(&Painter::plain()).lines().map(String::from).collect()
    }

    #[test]
    fn test_layout_alignment() {
        let mut table = Table::new(&[ColumnKey::Inbound.column(), ColumnKey::Alias.column()]);
        table.add_row(vec![Cell::plain("1,000"), Cell::plain("peer")]);
        table.add_row(vec![Cell::plain("5"), Cell::plain("x")]);

        let lines = plain_lines(&table);
        assert_eq!(lines[0], "");
        assert_eq!(lines[1], "");
        assert_eq!(lines[2], " inbound  alias");
        assert_eq!(lines[3], "─".repeat(7 + 5 + 4));
        assert_eq!(lines[4], "   1,000  peer");
        assert_eq!(lines[5], "       5  x");
        assert_eq!(table.row_count(), 2);
    }

    #[test]
    fn test_alias_truncated() {
        let mut table = Table::new(&[ColumnKey::Alias.column()]);
        table.add_row(vec![Cell::plain("a".repeat(40))]);
        let lines = plain_lines(&table);
        assert_eq!(lines[4], format!(" {}…", "a".repeat(24)));
    }

    #[test]
    fn test_wide_alias_aligns_following_column() {
        let mut table = Table::new(&[ColumnKey::Alias.column(), ColumnKey::ChanId.column()]);
        table.add_row(vec![Cell::plain("⚡⚡⚡⚡⚡⚡"), Cell::plain("1x1x0")]);
        table.add_row(vec![Cell::plain("plain"), Cell::plain("2x2x0")]);

        let lines = plain_lines(&table);
        // Six bolts take twelve cells, so the shorter alias gets seven spaces of padding.
        assert_eq!(lines[2], " alias         chan_id");
        assert_eq!(lines[4], " ⚡⚡⚡⚡⚡⚡  1x1x0");
        assert_eq!(lines[5], " plain         2x2x0");
    }

    #[test]
    fn test_escape_sequences_never_reach_output() {
        let mut table = Table::new(&[ColumnKey::Alias.column()]);
        table.add_row(vec![Cell::plain("evil\x1b[2J\x1b]0;pwn\x07")]);
        let out = table.render(&Painter::plain());
        assert!(!out.contains('\x1b'));
        assert!(!out.contains('\x07'));

        let info = grid(&[("alias     : ".to_string(), "me\x1b[31m".to_string())], &Painter::plain());
        assert_eq!(info, "alias     : me\u{fffd}[31m\n");
    }

    #[test]
    fn test_short_rows_padded() {
        let mut table = Table::new(&[ColumnKey::Inbound.column(), ColumnKey::Ratio.column()]);
        table.add_row(vec![Cell::plain("1")]);
        assert_eq!(table.rows[0].len(), 2);
    }

    #[test]
    fn test_grid() {
        let rows = vec![("alias     : ".to_string(), "node".to_string())];
        assert_eq!(grid(&rows, &Painter::plain()), "alias     : node\n");
    }
}
