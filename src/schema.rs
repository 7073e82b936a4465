//! Canonical column set of the sales table and the header aliases accepted for it.

use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashMap;

use crate::error::{DashboardError, Result};

lazy_static! {
    static ref NON_ALNUM: Regex = Regex::new(r"[^a-z0-9]+").unwrap();
}

/// Canonical columns of a sales row
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Column {
    Date,
    Branch,
    Product,
    Seller,
    Amount,
    Target,
    Hour,
}

impl Column {
    pub const ALL: [Column; 7] = [
        Column::Date,
        Column::Branch,
        Column::Product,
        Column::Seller,
        Column::Amount,
        Column::Target,
        Column::Hour,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Column::Date => "date",
            Column::Branch => "branch",
            Column::Product => "product",
            Column::Seller => "seller",
            Column::Amount => "amount",
            Column::Target => "target",
            Column::Hour => "hour",
        }
    }

    pub fn is_required(&self) -> bool {
        !matches!(self, Column::Seller | Column::Hour)
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Column::ALL
            .iter()
            .copied()
            .find(|c| c.name() == normalize_header(name))
    }

    fn builtin_aliases(&self) -> &'static [&'static str] {
        match self {
            Column::Date => &["date", "fecha", "day", "dia"],
            Column::Branch => &["branch", "sucursal", "store", "tienda"],
            Column::Product => &["product", "producto", "item", "articulo"],
            Column::Seller => &["seller", "vendedor", "salesperson", "asesor"],
            Column::Amount => &["amount", "sales", "ventas", "venta", "valor"],
            Column::Target => &["target", "meta", "goal", "quota", "objetivo"],
            Column::Hour => &["hour", "hora"],
        }
    }
}

/// Lower-cases, folds accents and drops punctuation so that
/// "Fecha ", "FECHA" and "fécha" compare equal.
pub fn normalize_header(raw: &str) -> String {
    let folded: String = raw.trim().to_lowercase().chars().map(fold_accent).collect();
    NON_ALNUM.replace_all(&folded, "").into_owned()
}

pub(crate) fn fold_accent(c: char) -> char {
    match c {
        'á' | 'à' | 'ä' | 'â' | 'ã' => 'a',
        'é' | 'è' | 'ë' | 'ê' => 'e',
        'í' | 'ì' | 'ï' | 'î' => 'i',
        'ó' | 'ò' | 'ö' | 'ô' | 'õ' => 'o',
        'ú' | 'ù' | 'ü' | 'û' => 'u',
        'ñ' => 'n',
        'ç' => 'c',
        other => other,
    }
}

/// Alias table mapping normalized header names to canonical columns
#[derive(Clone, Debug)]
pub struct HeaderAliases {
    aliases: HashMap<String, Column>,
}

impl Default for HeaderAliases {
    fn default() -> Self {
        let mut aliases = HashMap::new();
        for column in Column::ALL {
            for alias in column.builtin_aliases() {
                aliases.insert(normalize_header(alias), column);
            }
        }
        HeaderAliases { aliases }
    }
}

impl HeaderAliases {
    /// Registers an extra header name for `column`
    pub fn add(&mut self, column: Column, alias: &str) {
        self.aliases.insert(normalize_header(alias), column);
    }

    pub fn resolve(&self, header: &str) -> Option<Column> {
        self.aliases.get(&normalize_header(header)).copied()
    }

    /// Maps a header row to column positions.
    ///
    /// The first header resolving to a column wins; later duplicates are ignored.
    pub fn map_headers<S: AsRef<str>>(&self, headers: &[S]) -> Result<ColumnMap> {
        let mut positions = HashMap::new();
        for (idx, header) in headers.iter().enumerate() {
            if let Some(column) = self.resolve(header.as_ref()) {
                positions.entry(column).or_insert(idx);
            }
        }

        let missing: Vec<String> = Column::ALL
            .iter()
            .filter(|c| c.is_required() && !positions.contains_key(c))
            .map(|c| c.name().to_string())
            .collect();

        if !missing.is_empty() {
            return Err(DashboardError::Schema {
                missing,
                found: headers
                    .iter()
                    .map(|h| h.as_ref().trim().to_string())
                    .filter(|h| !h.is_empty())
                    .collect(),
            });
        }

        Ok(ColumnMap { positions })
    }
}

/// Resolved positions of the canonical columns within one source
#[derive(Clone, Debug)]
pub struct ColumnMap {
    positions: HashMap<Column, usize>,
}

impl ColumnMap {
    pub fn position(&self, column: Column) -> Option<usize> {
        self.positions.get(&column).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spanish_headers_map_to_canonical_columns() {
        let aliases = HeaderAliases::default();
        let map = aliases
            .map_headers(&["Fecha", "Sucursal", "Producto", "Vendedor", "Ventas", "Meta"])
            .unwrap();
        assert_eq!(map.position(Column::Date), Some(0));
        assert_eq!(map.position(Column::Seller), Some(3));
        assert_eq!(map.position(Column::Target), Some(5));
        assert_eq!(map.position(Column::Hour), None);
    }

    #[test]
    fn missing_required_column_is_a_schema_error() {
        let aliases = HeaderAliases::default();
        match aliases.map_headers(&["date", "branch", "product", "amount"]) {
            Err(DashboardError::Schema { missing, found }) => {
                assert_eq!(missing, vec!["target".to_string()]);
                assert_eq!(found.len(), 4);
            }
            other => panic!("expected schema error, got {:?}", other),
        }
    }

    #[test]
    fn seller_and_hour_are_optional() {
        let aliases = HeaderAliases::default();
        assert!(
            aliases
                .map_headers(&["date", "branch", "product", "amount", "target"])
                .is_ok()
        );
    }

    #[test]
    fn headers_are_normalized() {
        assert_eq!(normalize_header("  Día "), "dia");
        assert_eq!(normalize_header("Sales Amount ($)"), "salesamount");
        let mut aliases = HeaderAliases::default();
        assert_eq!(aliases.resolve("Sales Amount"), None);
        aliases.add(Column::Amount, "Sales Amount");
        assert_eq!(aliases.resolve("sales_amount"), Some(Column::Amount));
    }
}
