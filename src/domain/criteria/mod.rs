//
// Copyright (c) 2024 Nathan Fiedler
//
use crate::Error;
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

///
/// Comparison operator for a single field predicate.
///
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Operator {
    #[default]
    Eq,
    NotEq,
    Lt,
    Lte,
    Gt,
    Gte,
    Like,
    NotLike,
}

impl Operator {
    /// Return the SQL text for this operator.
    pub fn as_sql(&self) -> &'static str {
        match self {
            Operator::Eq => "=",
            Operator::NotEq => "<>",
            Operator::Lt => "<",
            Operator::Lte => "<=",
            Operator::Gt => ">",
            Operator::Gte => ">=",
            Operator::Like => "LIKE",
            Operator::NotLike => "NOT LIKE",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_sql())
    }
}

impl FromStr for Operator {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "=" | "==" => Ok(Operator::Eq),
            "!=" | "<>" => Ok(Operator::NotEq),
            "<" => Ok(Operator::Lt),
            "<=" => Ok(Operator::Lte),
            ">" => Ok(Operator::Gt),
            ">=" => Ok(Operator::Gte),
            "like" => Ok(Operator::Like),
            "not like" => Ok(Operator::NotLike),
            _ => Err(Error::InvalidOperator(s.to_owned())),
        }
    }
}

///
/// Sort direction for an ordering key.
///
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Direction::Asc => write!(f, "ASC"),
            Direction::Desc => write!(f, "DESC"),
        }
    }
}

impl FromStr for Direction {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "asc" => Ok(Direction::Asc),
            "desc" => Ok(Direction::Desc),
            _ => Err(Error::InvalidDirection(s.to_owned())),
        }
    }
}

///
/// Which rows are visible with respect to soft deletion.
///
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Visibility {
    /// Soft-deleted rows are excluded, _default_
    #[default]
    WithoutTrashed,
    /// Soft-deleted rows are included along with live rows.
    WithTrashed,
    /// Only soft-deleted rows are returned.
    OnlyTrashed,
}

///
/// A filter condition contributed by `and_where` or `or_where`.
///
#[derive(Clone, Debug, PartialEq)]
pub enum Predicate {
    /// Compare a single field against a value.
    Field {
        field: String,
        operator: Operator,
        value: Value,
    },
    /// Equality on every listed field, in the order given.
    AllEqual(Vec<(String, Value)>),
}

impl Predicate {
    /// Predicate matching rows where `field` equals `value`.
    pub fn eq<F: Into<String>, V: Into<Value>>(field: F, value: V) -> Self {
        Predicate::compare(field, Operator::Eq, value)
    }

    /// Predicate comparing `field` against `value` with the given operator.
    pub fn compare<F: Into<String>, V: Into<Value>>(field: F, operator: Operator, value: V) -> Self {
        Predicate::Field {
            field: field.into(),
            operator,
            value: value.into(),
        }
    }

    /// Predicate comparing `field` using an operator given as text, such as
    /// `">="` or `"like"`.
    pub fn parse<F: Into<String>, V: Into<Value>>(
        field: F,
        operator: &str,
        value: V,
    ) -> Result<Self, Error> {
        let operator = Operator::from_str(operator)?;
        Ok(Predicate::compare(field, operator, value))
    }

    /// Predicate requiring equality on every field of the mapping.
    pub fn all_eq<I, F, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (F, V)>,
        F: Into<String>,
        V: Into<Value>,
    {
        Predicate::AllEqual(
            pairs
                .into_iter()
                .map(|(f, v)| (f.into(), v.into()))
                .collect(),
        )
    }

    /// Return the names of the fields referenced by this predicate.
    pub fn fields(&self) -> Vec<&str> {
        match self {
            Predicate::Field { field, .. } => vec![field.as_str()],
            Predicate::AllEqual(pairs) => pairs.iter().map(|(f, _)| f.as_str()).collect(),
        }
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Predicate::Field {
                field,
                operator,
                value,
            } => write!(f, "{} {} {}", field, operator, value),
            Predicate::AllEqual(pairs) => {
                let parts: Vec<String> = pairs
                    .iter()
                    .map(|(field, value)| format!("{} = {}", field, value))
                    .collect();
                write!(f, "({})", parts.join(" AND "))
            }
        }
    }
}

///
/// Pending query directives recorded by the chainable repository methods.
///
/// Nothing here touches the store; the directives are compiled into a
/// `Query` only when a terminal operation runs.
///
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Criteria {
    visibility: Visibility,
    wheres: Vec<Predicate>,
    or_wheres: Vec<Predicate>,
    skip: Option<u64>,
    take: Option<u64>,
    orders: Vec<(String, Direction)>,
}

impl Criteria {
    ///
    /// Include soft-deleted rows. Has no effect once only-trashed has been
    /// requested, which always takes precedence.
    ///
    pub fn with_trashed(&mut self) -> &mut Self {
        if self.visibility != Visibility::OnlyTrashed {
            self.visibility = Visibility::WithTrashed;
        }
        self
    }

    /// Return only soft-deleted rows.
    pub fn only_trashed(&mut self) -> &mut Self {
        self.visibility = Visibility::OnlyTrashed;
        self
    }

    pub fn and_where(&mut self, predicate: Predicate) -> &mut Self {
        self.wheres.push(predicate);
        self
    }

    pub fn or_where(&mut self, predicate: Predicate) -> &mut Self {
        self.or_wheres.push(predicate);
        self
    }

    /// Set the row offset, replacing any earlier value.
    pub fn skip(&mut self, offset: u64) -> &mut Self {
        self.skip = Some(offset);
        self
    }

    /// Set the row limit, replacing any earlier value.
    pub fn take(&mut self, limit: u64) -> &mut Self {
        self.take = Some(limit);
        self
    }

    /// Append a sort key; earlier keys take precedence over later ones.
    pub fn order_by<F: Into<String>>(&mut self, field: F, direction: Direction) -> &mut Self {
        self.orders.push((field.into(), direction));
        self
    }

    pub fn visibility(&self) -> Visibility {
        self.visibility
    }

    pub fn wheres(&self) -> &[Predicate] {
        &self.wheres
    }

    pub fn or_wheres(&self) -> &[Predicate] {
        &self.or_wheres
    }

    pub fn skip_value(&self) -> Option<u64> {
        self.skip
    }

    pub fn take_value(&self) -> Option<u64> {
        self.take
    }

    pub fn orders(&self) -> &[(String, Direction)] {
        &self.orders
    }

    /// Return `true` if no directive has been recorded.
    pub fn is_empty(&self) -> bool {
        *self == Criteria::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operator_from_str() {
        assert_eq!(Operator::from_str("=").unwrap(), Operator::Eq);
        assert_eq!(Operator::from_str("<>").unwrap(), Operator::NotEq);
        assert_eq!(Operator::from_str("!=").unwrap(), Operator::NotEq);
        assert_eq!(Operator::from_str(">=").unwrap(), Operator::Gte);
        assert_eq!(Operator::from_str("LIKE").unwrap(), Operator::Like);
        assert_eq!(Operator::from_str("not like").unwrap(), Operator::NotLike);
        let result = Operator::from_str("~=");
        assert!(result.is_err());
        assert_eq!(result.unwrap_err().to_string(), "invalid operator: ~=");
    }

    #[test]
    fn test_direction_from_str() {
        assert_eq!(Direction::from_str("asc").unwrap(), Direction::Asc);
        assert_eq!(Direction::from_str("DESC").unwrap(), Direction::Desc);
        assert_eq!(Direction::default(), Direction::Asc);
        assert!(Direction::from_str("sideways").is_err());
    }

    #[test]
    fn test_predicate_shapes() -> Result<(), Error> {
        let single = Predicate::parse("count", ">=", 10)?;
        assert_eq!(single, Predicate::compare("count", Operator::Gte, 10));
        assert_eq!(single.to_string(), "count >= 10");
        assert_eq!(single.fields(), vec!["count"]);

        let mapping = Predicate::all_eq([("customer_name", "Acme"), ("location", "Paris")]);
        assert_eq!(mapping.fields(), vec!["customer_name", "location"]);
        assert_eq!(
            mapping.to_string(),
            r#"(customer_name = "Acme" AND location = "Paris")"#
        );
        Ok(())
    }

    #[test]
    fn test_criteria_visibility() {
        let mut criteria = Criteria::default();
        assert_eq!(criteria.visibility(), Visibility::WithoutTrashed);
        criteria.with_trashed().with_trashed();
        assert_eq!(criteria.visibility(), Visibility::WithTrashed);

        // only trashed wins regardless of call order
        criteria.only_trashed();
        assert_eq!(criteria.visibility(), Visibility::OnlyTrashed);
        criteria.with_trashed();
        assert_eq!(criteria.visibility(), Visibility::OnlyTrashed);
    }

    #[test]
    fn test_criteria_skip_take_overwrite() {
        let mut criteria = Criteria::default();
        criteria.take(10).take(5).skip(20).skip(3);
        assert_eq!(criteria.take_value(), Some(5));
        assert_eq!(criteria.skip_value(), Some(3));
    }

    #[test]
    fn test_criteria_appends_in_order() {
        let mut criteria = Criteria::default();
        assert!(criteria.is_empty());
        criteria
            .and_where(Predicate::eq("a", 1))
            .or_where(Predicate::eq("b", 2))
            .and_where(Predicate::eq("c", 3))
            .order_by("a", Direction::Asc)
            .order_by("b", Direction::Desc);
        assert!(!criteria.is_empty());
        assert_eq!(
            criteria.wheres(),
            &[Predicate::eq("a", 1), Predicate::eq("c", 3)]
        );
        assert_eq!(criteria.or_wheres(), &[Predicate::eq("b", 2)]);
        assert_eq!(
            criteria.orders(),
            &[
                ("a".to_string(), Direction::Asc),
                ("b".to_string(), Direction::Desc)
            ]
        );
    }
}
