//! Clause tree rendered into WHERE and SET fragments.

use std::fmt::{self, Write as _};
use std::sync::Arc;

use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::arg::{ColumnArg, SelectArg};
use crate::dialect::DatabaseType;
use crate::error::Result;
use crate::field::FieldDescriptor;
use crate::select::SelectBuilder;
use crate::value::{Record, Value};
use crate::builder_err;

/// Right-hand side of a comparison.
#[derive(Debug, Clone)]
pub enum Operand {
    /// Literal value, inlined or bound depending on the field's persister.
    Value(Value),
    /// Bound `?` argument.
    Arg(SelectArg),
    /// Another column.
    Column(ColumnArg),
}

impl From<Value> for Operand {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}

impl From<SelectArg> for Operand {
    fn from(arg: SelectArg) -> Self {
        Self::Arg(arg)
    }
}

impl From<&SelectArg> for Operand {
    fn from(arg: &SelectArg) -> Self {
        Self::Arg(arg.clone())
    }
}

impl From<ColumnArg> for Operand {
    fn from(column: ColumnArg) -> Self {
        Self::Column(column)
    }
}

macro_rules! operand_from {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for Operand {
                fn from(value: $ty) -> Self {
                    Self::Value(value.into())
                }
            }
        )*
    };
}

operand_from!(
    bool, char, i8, i16, i32, i64, f32, f64, String, &str, Vec<u8>, Decimal, Uuid, NaiveDateTime,
    serde_json::Value, Record
);

impl<T: Into<Value>> From<Option<T>> for Operand {
    fn from(value: Option<T>) -> Self {
        Self::Value(value.into())
    }
}

/// Binary comparison operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompareOp {
    /// `=`
    Eq,
    /// `<>`
    Ne,
    /// `>`
    Gt,
    /// `>=`
    Ge,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `LIKE`
    Like,
    /// Caller supplied operator.
    Raw(String),
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Eq => "=",
            Self::Ne => "<>",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Like => "LIKE",
            Self::Raw(op) => op,
        })
    }
}

/// Boolean connective.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Combine {
    /// `AND`
    And,
    /// `OR`
    Or,
}

impl Combine {
    const fn as_str(self) -> &'static str {
        match self {
            Self::And => "AND",
            Self::Or => "OR",
        }
    }
}

/// Node of the clause tree.
#[derive(Debug, Clone)]
pub enum Clause {
    /// `column op value`
    Compare {
        /// Compared field.
        field: Arc<FieldDescriptor>,
        /// Operator.
        op: CompareOp,
        /// Right-hand side.
        value: Operand,
    },
    /// `column BETWEEN low AND high`
    Between {
        /// Compared field.
        field: Arc<FieldDescriptor>,
        /// Lower bound.
        low: Operand,
        /// Upper bound.
        high: Operand,
    },
    /// `column [NOT] IN (values)`
    In {
        /// Compared field.
        field: Arc<FieldDescriptor>,
        /// Candidate values.
        values: Vec<Operand>,
        /// `NOT IN`
        negated: bool,
    },
    /// `column [NOT] IN (subquery)`
    InSubQuery {
        /// Compared field.
        field: Arc<FieldDescriptor>,
        /// Inner query.
        query: Box<SelectBuilder>,
        /// `NOT IN`
        negated: bool,
    },
    /// `column IS [NOT] NULL`
    IsNull {
        /// Tested field.
        field: Arc<FieldDescriptor>,
        /// `IS NOT NULL`
        negated: bool,
    },
    /// `EXISTS (subquery)`
    Exists(Box<SelectBuilder>),
    /// Raw SQL with bound arguments.
    Raw {
        /// SQL text.
        statement: String,
        /// Arguments in placeholder order.
        args: Vec<SelectArg>,
    },
    /// `(NOT clause)`. `None` while the operand is pending.
    Not(Option<Box<Self>>),
    /// Two or more clauses joined by one connective. `open` while the last operand is pending.
    Many {
        /// Connective.
        op: Combine,
        /// Operands in order.
        clauses: Vec<Self>,
        /// Awaiting one more operand.
        open: bool,
    },
    /// `column = value` in an UPDATE.
    SetValue {
        /// Updated field.
        field: Arc<FieldDescriptor>,
        /// New value; NULL is bound as an argument.
        value: Operand,
    },
    /// `column = expression` in an UPDATE.
    SetExpression {
        /// Updated field.
        field: Arc<FieldDescriptor>,
        /// SQL expression.
        expression: String,
    },
}

impl Clause {
    /// Whether the clause can be wrapped by NOT.
    pub(crate) const fn is_negatable(&self) -> bool {
        matches!(
            self,
            Self::Compare { .. }
                | Self::Between { .. }
                | Self::In { .. }
                | Self::InSubQuery { .. }
                | Self::IsNull { .. }
                | Self::Exists(_)
        )
    }

    /// Whether the clause, or a clause nested in it, still awaits an operand.
    pub(crate) fn has_hole(&self) -> bool {
        match self {
            Self::Not(None) => true,
            Self::Not(Some(inner)) => inner.has_hole(),
            Self::Many { open: true, .. } => true,
            Self::Many { clauses, .. } => clauses.last().is_some_and(Self::has_hole),
            _ => false,
        }
    }

    /// Places `clause` into the pending operand slot.
    pub(crate) fn fill_hole(&mut self, clause: Self) -> Result<()> {
        match self {
            Self::Not(slot @ None) => {
                if !clause.is_negatable() {
                    return Err(builder_err!(
                        "NOT operation can only work with comparison SQL clauses, not {}",
                        clause.describe()
                    ));
                }
                *slot = Some(Box::new(clause));
                Ok(())
            }
            Self::Not(Some(inner)) => inner.fill_hole(clause),
            Self::Many { clauses, open, .. } if *open => {
                clauses.push(clause);
                *open = false;
                Ok(())
            }
            Self::Many { clauses, .. } => match clauses.last_mut() {
                Some(last) => last.fill_hole(clause),
                None => Err(builder_err!("no clause is waiting for {}", clause.describe())),
            },
            other => Err(builder_err!(
                "{} is not waiting for a clause, can't add: {}",
                other.describe(),
                clause.describe()
            )),
        }
    }

    /// Short description used in error messages.
    pub(crate) fn describe(&self) -> String {
        match self {
            Self::Compare { field, op, .. } => format!("{} {op}", field.column_name()),
            Self::Between { field, .. } => format!("{} BETWEEN", field.column_name()),
            Self::In { field, negated, .. } | Self::InSubQuery { field, negated, .. } => {
                format!("{} {}IN", field.column_name(), if *negated { "NOT " } else { "" })
            }
            Self::IsNull { field, negated } => {
                format!("{} IS {}NULL", field.column_name(), if *negated { "NOT " } else { "" })
            }
            Self::Exists(_) => "EXISTS".to_string(),
            Self::Raw { statement, .. } => format!("raw '{statement}'"),
            Self::Not(_) => "NOT".to_string(),
            Self::Many { op, .. } => op.as_str().to_string(),
            Self::SetValue { field, .. } | Self::SetExpression { field, .. } => {
                format!("SET {}", field.column_name())
            }
        }
    }

    /// Appends the SQL of this clause, collecting `?` arguments in order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BuilderState`](crate::Error::BuilderState) for unset operands or
    /// mismatched subqueries, and conversion errors from persisters.
    pub fn append_sql(
        &self, dialect: &dyn DatabaseType, table_name: Option<&str>, sb: &mut String,
        args: &mut Vec<SelectArg>,
    ) -> Result<()> {
        match self {
            Self::Compare { field, op, value } => {
                append_column(dialect, table_name, field, sb);
                let _ = write!(sb, "{op} ");
                append_arg_or_value(dialect, field, sb, args, value)
            }
            Self::Between { field, low, high } => {
                append_column(dialect, table_name, field, sb);
                sb.push_str("BETWEEN ");
                if is_null_operand(low) {
                    return Err(builder_err!("BETWEEN low value for '{}' is null", field.column_name()));
                }
                append_arg_or_value(dialect, field, sb, args, low)?;
                sb.push_str("AND ");
                if is_null_operand(high) {
                    return Err(builder_err!("BETWEEN high value for '{}' is null", field.column_name()));
                }
                append_arg_or_value(dialect, field, sb, args, high)
            }
            Self::In { field, values, negated } => {
                append_column(dialect, table_name, field, sb);
                sb.push_str(if *negated { "NOT IN " } else { "IN " });
                sb.push('(');
                for (i, value) in values.iter().enumerate() {
                    if is_null_operand(value) {
                        return Err(builder_err!(
                            "one of the IN values for '{}' is null",
                            field.column_name()
                        ));
                    }
                    if i > 0 {
                        sb.push(',');
                    }
                    append_arg_or_value(dialect, field, sb, args, value)?;
                }
                sb.push_str(") ");
                Ok(())
            }
            Self::InSubQuery { field, query, negated } => {
                append_column(dialect, table_name, field, sb);
                sb.push_str(if *negated { "NOT IN " } else { "IN " });
                sb.push('(');
                let (_, result_fields) = query.append_statement_string(sb, args)?;
                match result_fields.as_deref() {
                    // raw inner selects are taken as they are
                    None => {}
                    Some([inner]) => {
                        if inner.sql_type() != field.sql_type() {
                            return Err(builder_err!(
                                "Outer column {field} is not the same type as inner column {inner}"
                            ));
                        }
                    }
                    Some(fields) => {
                        return Err(builder_err!(
                            "There must be only 1 result column in sub-query but we found {}",
                            fields.len()
                        ));
                    }
                }
                sb.push_str(") ");
                Ok(())
            }
            Self::IsNull { field, negated } => {
                append_column(dialect, table_name, field, sb);
                sb.push_str(if *negated { "IS NOT NULL " } else { "IS NULL " });
                Ok(())
            }
            Self::Exists(query) => {
                sb.push_str("EXISTS (");
                query.append_statement_string(sb, args)?;
                sb.push_str(") ");
                Ok(())
            }
            Self::Raw { statement, args: raw_args } => {
                sb.push_str(statement);
                sb.push(' ');
                args.extend(raw_args.iter().cloned());
                Ok(())
            }
            Self::Not(inner) => {
                let Some(inner) = inner else {
                    return Err(builder_err!("Clause has not been set in NOT operation"));
                };
                sb.push_str("(NOT ");
                inner.append_sql(dialect, table_name, sb, args)?;
                sb.push_str(") ");
                Ok(())
            }
            Self::Many { op, clauses, .. } => {
                sb.push('(');
                for (i, clause) in clauses.iter().enumerate() {
                    if i > 0 {
                        sb.push_str(op.as_str());
                        sb.push(' ');
                    }
                    clause.append_sql(dialect, table_name, sb, args)?;
                }
                sb.push_str(") ");
                Ok(())
            }
            Self::SetValue { field, value } => {
                dialect.append_escaped_entity_name(sb, field.column_name());
                sb.push_str(" = ");
                if is_null_operand(value) {
                    sb.push_str("? ");
                    let arg = SelectArg::null();
                    arg.set_meta_info(field.column_name(), Some(field))?;
                    args.push(arg);
                    return Ok(());
                }
                append_arg_or_value(dialect, field, sb, args, value)
            }
            Self::SetExpression { field, expression } => {
                dialect.append_escaped_entity_name(sb, field.column_name());
                sb.push_str(" = ");
                sb.push_str(expression);
                sb.push(' ');
                Ok(())
            }
        }
    }
}

const fn is_null_operand(operand: &Operand) -> bool {
    matches!(operand, Operand::Value(Value::Null))
}

fn append_column(dialect: &dyn DatabaseType, table_name: Option<&str>, field: &FieldDescriptor, sb: &mut String) {
    if let Some(table) = table_name {
        dialect.append_escaped_entity_name(sb, table);
        sb.push('.');
    }
    dialect.append_escaped_entity_name(sb, field.column_name());
    sb.push(' ');
}

fn append_arg_or_value(
    dialect: &dyn DatabaseType, field: &Arc<FieldDescriptor>, sb: &mut String,
    args: &mut Vec<SelectArg>, operand: &Operand,
) -> Result<()> {
    match operand {
        Operand::Value(Value::Null) => {
            return Err(builder_err!("argument for '{}' is null", field.name()));
        }
        Operand::Arg(arg) => {
            sb.push('?');
            arg.set_meta_info(field.column_name(), Some(field))?;
            args.push(arg.clone());
        }
        Operand::Column(column) => {
            if let Some(table) = &column.table {
                dialect.append_escaped_entity_name(sb, table);
                sb.push('.');
            }
            dialect.append_escaped_entity_name(sb, &column.column);
        }
        Operand::Value(value) if field.is_arg_holder_required() => {
            sb.push('?');
            let arg = SelectArg::with_value(value.clone());
            arg.set_meta_info(field.column_name(), Some(field))?;
            args.push(arg);
        }
        Operand::Value(value @ Value::Object(_)) if field.is_foreign() => {
            let id = Operand::Value(field.foreign_id_of(value));
            return append_arg_or_value(dialect, field, sb, args, &id);
        }
        Operand::Value(value) if field.is_escaped_value() => {
            dialect.append_escaped_word(sb, &field.to_sql_arg(value)?.to_string());
        }
        Operand::Value(value) if field.is_foreign() => {
            let literal = field.to_sql_arg(value)?.to_string();
            if !literal.starts_with(|c: char| "0123456789.-+".contains(c)) {
                return Err(builder_err!(
                    "Foreign field {field} does not seem to be producing a numerical value '{literal}'. Maybe you are passing the wrong object to comparison"
                ));
            }
            sb.push_str(&literal);
        }
        Operand::Value(value) => {
            sb.push_str(&field.to_sql_arg(value)?.to_string());
        }
    }
    sb.push(' ');
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FieldConfig, TableConfig};
    use crate::dialect::SqliteDialect;
    use crate::table::Schema;
    use crate::value::NativeType;

    fn schema() -> Schema {
        Schema::builder()
            .table(
                TableConfig::new("account")
                    .field(FieldConfig::of("id", NativeType::Long).generated_id())
                    .field(FieldConfig::of("name", NativeType::String))
                    .field(FieldConfig::of("payload", NativeType::Bytes)),
            )
            .table(
                TableConfig::new("order")
                    .field(FieldConfig::of("id", NativeType::Long).generated_id())
                    .field(FieldConfig::new("account").foreign("account")),
            )
            .build()
            .unwrap()
    }

    fn render(clause: &Clause, table: Option<&str>) -> Result<(String, Vec<SelectArg>)> {
        let mut sb = String::new();
        let mut args = Vec::new();
        clause.append_sql(&SqliteDialect, table, &mut sb, &mut args)?;
        Ok((sb, args))
    }

    #[test]
    fn comparison_forms() {
        let schema = schema();
        let account = schema.table("account").unwrap();
        let name = Arc::clone(account.field_by_name("name").unwrap());
        let id = Arc::clone(account.field_by_name("id").unwrap());

        let eq = Clause::Compare { field: Arc::clone(&name), op: CompareOp::Eq, value: "o'neil".into() };
        assert_eq!(render(&eq, None).unwrap().0, "`name` = 'o''neil' ");
        assert_eq!(render(&eq, Some("a")).unwrap().0, "`a`.`name` = 'o''neil' ");

        let within = Clause::In {
            field: Arc::clone(&id),
            values: vec![1_i64.into(), 2_i64.into()],
            negated: false,
        };
        assert_eq!(render(&within, None).unwrap().0, "`id` IN (1 ,2 ) ");

        let between = Clause::Between { field: Arc::clone(&id), low: 1_i64.into(), high: 5_i64.into() };
        assert_eq!(render(&between, None).unwrap().0, "`id` BETWEEN 1 AND 5 ");

        let null = Clause::IsNull { field: Arc::clone(&name), negated: true };
        assert_eq!(render(&null, None).unwrap().0, "`name` IS NOT NULL ");

        let arg = SelectArg::new();
        let bound = Clause::Compare { field: name, op: CompareOp::Ge, value: (&arg).into() };
        let (sql, args) = render(&bound, None).unwrap();
        assert_eq!(sql, "`name` >= ? ");
        assert_eq!(args.len(), 1);
        assert_eq!(arg.column_name().as_deref(), Some("name"));
    }

    #[test]
    fn composite_forms() {
        let schema = schema();
        let account = schema.table("account").unwrap();
        let name = account.field_by_name("name").unwrap();
        let id = account.field_by_name("id").unwrap();
        let many = Clause::Many {
            op: Combine::Or,
            clauses: vec![
                Clause::Compare { field: Arc::clone(name), op: CompareOp::Like, value: "a%".into() },
                Clause::Not(Some(Box::new(Clause::IsNull { field: Arc::clone(id), negated: false }))),
            ],
            open: false,
        };
        assert_eq!(render(&many, None).unwrap().0, "(`name` LIKE 'a%' OR (NOT `id` IS NULL ) ) ");
    }

    #[test]
    fn binary_fields_bind_arguments() {
        let schema = schema();
        let payload = Arc::clone(schema.table("account").unwrap().field_by_name("payload").unwrap());
        let set = Clause::SetValue { field: payload, value: vec![1_u8, 2].into() };
        let (sql, args) = render(&set, None).unwrap();
        assert_eq!(sql, "`payload` = ? ");
        assert_eq!(args[0].sql_arg_value().unwrap(), Value::Bytes(vec![1, 2]));
    }

    #[test]
    fn foreign_values() {
        let schema = schema();
        let account_ref = Arc::clone(schema.table("order").unwrap().field_by_name("account").unwrap());
        let parent = Record::new("account").with("id", 7_i64);
        let eq = Clause::Compare { field: Arc::clone(&account_ref), op: CompareOp::Eq, value: parent.into() };
        assert_eq!(render(&eq, None).unwrap().0, "`account_id` = 7 ");

        let null = Clause::Compare { field: account_ref, op: CompareOp::Eq, value: Value::Null.into() };
        let err = render(&null, None).unwrap_err();
        assert!(err.to_string().contains("argument for 'account' is null"));
    }

    #[test]
    fn holes() {
        let mut not = Clause::Not(None);
        assert!(not.has_hole());
        let err = not
            .fill_hole(Clause::Raw { statement: "1 = 1".to_string(), args: Vec::new() })
            .unwrap_err();
        assert!(err.to_string().contains("NOT operation can only work with comparison SQL clauses"));
    }
}
