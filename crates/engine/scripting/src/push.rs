//! Push engine: native inputs into fresh dynamic values

use crate::binding::{check_arity, Input};
use crate::marshal::Marshaller;
use crate::schema::{Directive, Schema};
use crate::value::{Table, Value};
use crate::{Error, Result};

impl Marshaller<'_> {
    /// Build one value per top-level directive from `inputs`
    pub fn push(&self, schema: &str, inputs: Vec<Input>) -> Result<Vec<Value>> {
        let schema = Schema::parse_with_limit(schema, self.max_depth)?;
        self.push_schema(&schema, inputs)
    }

    /// Push against an already parsed schema
    pub fn push_schema(&self, schema: &Schema, inputs: Vec<Input>) -> Result<Vec<Value>> {
        check_arity(&schema.leaves(), inputs.iter().map(Input::tag))?;

        let mut inputs = inputs.into_iter();
        schema
            .directives()
            .iter()
            .map(|directive| build(directive, &mut inputs, 1, self.max_depth))
            .collect()
    }
}

fn build(
    directive: &Directive,
    inputs: &mut impl Iterator<Item = Input>,
    depth: usize,
    max_depth: usize,
) -> Result<Value> {
    if depth > max_depth {
        return Err(Error::RecursionLimit { limit: max_depth });
    }

    match directive {
        Directive::Leaf(tag) => inputs.next().map(Input::into_value).ok_or(Error::Arity {
            index: 0,
            expected: Some(*tag),
            found: None,
        }),
        Directive::Table(pairs) => {
            let mut table = Table::new();
            for (key, child) in pairs {
                table.insert(key.clone(), build(child, inputs, depth + 1, max_depth)?);
            }
            Ok(Value::Table(table))
        }
    }
}
