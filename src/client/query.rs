//! Typed query builder over an introspected schema.
//!
//! Selections are created by naming the (type, field) pair, mirroring how
//! the schema itself is organized; an unknown pair is a construction error
//! surfaced as an explicit `Err` the caller checks before executing, never
//! a sentinel value. Rendering produces canonical query text.

use std::fmt::Write;

use super::schema::SchemaIndex;
use super::{ClientError, ClientResult};

/// A literal argument value.
#[derive(Debug, Clone)]
pub enum ArgValue {
    Str(String),
    Int(i64),
    Bool(bool),
}

impl From<&str> for ArgValue {
    fn from(s: &str) -> Self {
        ArgValue::Str(s.to_string())
    }
}

impl From<String> for ArgValue {
    fn from(s: String) -> Self {
        ArgValue::Str(s)
    }
}

impl From<i64> for ArgValue {
    fn from(n: i64) -> Self {
        ArgValue::Int(n)
    }
}

impl From<bool> for ArgValue {
    fn from(b: bool) -> Self {
        ArgValue::Bool(b)
    }
}

impl ArgValue {
    fn render(&self, out: &mut String) {
        match self {
            ArgValue::Str(s) => {
                out.push('"');
                for c in s.chars() {
                    match c {
                        '"' => out.push_str("\\\""),
                        '\\' => out.push_str("\\\\"),
                        '\n' => out.push_str("\\n"),
                        c => out.push(c),
                    }
                }
                out.push('"');
            }
            ArgValue::Int(n) => {
                let _ = write!(out, "{}", n);
            }
            ArgValue::Bool(b) => {
                let _ = write!(out, "{}", b);
            }
        }
    }
}

#[derive(Debug, Clone)]
enum SelectionItem {
    Field(Selection),
    FragmentSpread(String),
}

/// One field selection with its arguments and nested selections.
#[derive(Debug, Clone)]
pub struct Selection {
    field: String,
    args: Vec<(String, ArgValue)>,
    items: Vec<SelectionItem>,
}

impl Selection {
    pub fn arg(mut self, name: &str, value: impl Into<ArgValue>) -> Self {
        self.args.push((name.to_string(), value.into()));
        self
    }

    pub fn select(mut self, child: Selection) -> Self {
        self.items.push(SelectionItem::Field(child));
        self
    }

    pub fn spread(mut self, fragment: &Fragment) -> Self {
        self.items
            .push(SelectionItem::FragmentSpread(fragment.name.clone()));
        self
    }

    fn render(&self, alias: Option<&str>, out: &mut String) {
        if let Some(alias) = alias {
            let _ = write!(out, "{}: ", alias);
        }
        out.push_str(&self.field);
        if !self.args.is_empty() {
            out.push('(');
            for (i, (name, value)) in self.args.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                let _ = write!(out, "{}: ", name);
                value.render(out);
            }
            out.push(')');
        }
        if !self.items.is_empty() {
            out.push_str(" { ");
            for (i, item) in self.items.iter().enumerate() {
                if i > 0 {
                    out.push(' ');
                }
                match item {
                    SelectionItem::Field(child) => child.render(None, out),
                    SelectionItem::FragmentSpread(name) => {
                        let _ = write!(out, "...{}", name);
                    }
                }
            }
            out.push_str(" }");
        }
    }
}

/// A named fragment on a concrete type.
#[derive(Debug, Clone)]
pub struct Fragment {
    name: String,
    on_type: String,
    items: Vec<SelectionItem>,
}

impl Fragment {
    pub fn select(mut self, child: Selection) -> Self {
        self.items.push(SelectionItem::Field(child));
        self
    }

    fn render(&self, out: &mut String) {
        let _ = write!(out, "fragment {} on {} {{ ", self.name, self.on_type);
        for (i, item) in self.items.iter().enumerate() {
            if i > 0 {
                out.push(' ');
            }
            match item {
                SelectionItem::Field(child) => child.render(None, out),
                SelectionItem::FragmentSpread(name) => {
                    let _ = write!(out, "...{}", name);
                }
            }
        }
        out.push_str(" }");
    }
}

/// Builder handle over an introspected schema.
pub struct QueryBuilder<'a> {
    schema: &'a SchemaIndex,
}

impl<'a> QueryBuilder<'a> {
    pub fn new(schema: &'a SchemaIndex) -> Self {
        Self { schema }
    }

    /// A selection on the root query type.
    pub fn query_field(&self, field: &str) -> ClientResult<Selection> {
        self.field(self.schema.query_type(), field)
    }

    /// A selection on a named object type. Unknown type or field is a
    /// construction error.
    pub fn field(&self, type_name: &str, field: &str) -> ClientResult<Selection> {
        if !self.schema.has_type(type_name) {
            return Err(ClientError::QueryBuild(format!(
                "schema has no type '{}'",
                type_name
            )));
        }
        if self.schema.field(type_name, field).is_none() {
            return Err(ClientError::QueryBuild(format!(
                "type '{}' has no field '{}'",
                type_name, field
            )));
        }
        Ok(Selection {
            field: field.to_string(),
            args: Vec::new(),
            items: Vec::new(),
        })
    }

    /// A named fragment on a concrete type.
    pub fn fragment(&self, name: &str, on_type: &str) -> ClientResult<Fragment> {
        if !self.schema.has_type(on_type) {
            return Err(ClientError::QueryBuild(format!(
                "cannot declare fragment '{}' on unknown type '{}'",
                name, on_type
            )));
        }
        Ok(Fragment {
            name: name.to_string(),
            on_type: on_type.to_string(),
            items: Vec::new(),
        })
    }
}

/// A complete operation: aliased root selections plus any fragments.
#[derive(Debug, Clone)]
pub struct QueryDocument {
    selections: Vec<(String, Selection)>,
    fragments: Vec<Fragment>,
}

impl QueryDocument {
    pub fn new() -> Self {
        Self {
            selections: Vec::new(),
            fragments: Vec::new(),
        }
    }

    /// Add an aliased root selection; the alias becomes the result key.
    pub fn selection(mut self, alias: &str, selection: Selection) -> Self {
        self.selections.push((alias.to_string(), selection));
        self
    }

    pub fn fragment(mut self, fragment: Fragment) -> Self {
        self.fragments.push(fragment);
        self
    }

    pub fn render(&self) -> String {
        let mut out = String::from("query { ");
        for (i, (alias, selection)) in self.selections.iter().enumerate() {
            if i > 0 {
                out.push(' ');
            }
            selection.render(Some(alias), &mut out);
        }
        out.push_str(" }");
        for fragment in &self.fragments {
            out.push(' ');
            fragment.render(&mut out);
        }
        out
    }
}

impl Default for QueryDocument {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::schema::tests::countries_introspection;
    use crate::client::SchemaIndex;

    fn schema() -> SchemaIndex {
        SchemaIndex::from_introspection(&countries_introspection()).unwrap()
    }

    #[test]
    fn continents_query_renders_canonically() {
        let schema = schema();
        let ds = QueryBuilder::new(&schema);
        let doc = QueryDocument::new().selection(
            "GetContinents",
            ds.query_field("continents")
                .unwrap()
                .select(ds.field("Continent", "code").unwrap())
                .select(ds.field("Continent", "name").unwrap()),
        );
        assert_eq!(
            doc.render(),
            "query { GetContinents: continents { code name } }"
        );
    }

    #[test]
    fn country_by_code_query_renders_arguments_and_nesting() {
        let schema = schema();
        let ds = QueryBuilder::new(&schema);
        let doc = QueryDocument::new().selection(
            "GetCountryByCode",
            ds.query_field("country")
                .unwrap()
                .arg("code", "IE")
                .select(
                    ds.field("Country", "continent")
                        .unwrap()
                        .select(ds.field("Continent", "name").unwrap()),
                )
                .select(ds.field("Country", "name").unwrap())
                .select(ds.field("Country", "capital").unwrap())
                .select(ds.field("Country", "currency").unwrap())
                .select(
                    ds.field("Country", "languages")
                        .unwrap()
                        .select(ds.field("Language", "code").unwrap())
                        .select(ds.field("Language", "name").unwrap()),
                ),
        );
        assert_eq!(
            doc.render(),
            "query { GetCountryByCode: country(code: \"IE\") { continent { name } name capital \
             currency languages { code name } } }"
        );
    }

    #[test]
    fn fragment_query_renders_spread_and_definition() {
        let schema = schema();
        let ds = QueryBuilder::new(&schema);
        let country_info = ds
            .fragment("CountryInfo", "Country")
            .unwrap()
            .select(ds.field("Country", "code").unwrap())
            .select(ds.field("Country", "name").unwrap())
            .select(ds.field("Country", "capital").unwrap())
            .select(ds.field("Country", "currency").unwrap());

        let doc = QueryDocument::new()
            .selection(
                "GetCountriesonContinent",
                ds.query_field("continent")
                    .unwrap()
                    .arg("code", "EU")
                    .select(ds.field("Continent", "code").unwrap())
                    .select(ds.field("Continent", "name").unwrap())
                    .select(
                        ds.field("Continent", "countries")
                            .unwrap()
                            .spread(&country_info),
                    ),
            )
            .fragment(country_info.clone());

        assert_eq!(
            doc.render(),
            "query { GetCountriesonContinent: continent(code: \"EU\") { code name countries \
             { ...CountryInfo } } } fragment CountryInfo on Country { code name capital currency }"
        );
    }

    #[test]
    fn unknown_field_is_a_build_error_not_a_sentinel() {
        let schema = schema();
        let ds = QueryBuilder::new(&schema);
        let err = ds.field("Country", "population").unwrap_err();
        assert!(matches!(err, ClientError::QueryBuild(_)));
        assert!(ds.field("Planet", "name").is_err());
        assert!(ds.fragment("Info", "Planet").is_err());
    }

    #[test]
    fn string_arguments_are_escaped() {
        let schema = schema();
        let ds = QueryBuilder::new(&schema);
        let doc = QueryDocument::new().selection(
            "Q",
            ds.query_field("country")
                .unwrap()
                .arg("code", "quo\"te\\back"),
        );
        assert_eq!(
            doc.render(),
            "query { Q: country(code: \"quo\\\"te\\\\back\") }"
        );
    }
}
