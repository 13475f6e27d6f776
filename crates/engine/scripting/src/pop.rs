//! Pop engine: dynamic values into native slots
//!
//! Directives are visited in schema order; each leaf consumes the next slot.
//! Table pairs are looked up in schema order, never in the table's own
//! iteration order.

use crate::binding::{check_arity, Slot};
use crate::marshal::{KeyPath, Marshaller, Policy};
use crate::schema::{Directive, Schema};
use crate::value::Value;
use crate::{Error, Result};
use std::slice::IterMut;
use tracing::Level;

impl Marshaller<'_> {
    /// Pop a single value
    pub fn pop(&self, value: &Value, schema: &str, slots: &mut [Slot<'_>]) -> Result<()> {
        self.pop_sequence(std::slice::from_ref(value), schema, slots)
    }

    /// Pop one value per top-level directive, in order. Missing values are
    /// treated as nil; extra values are ignored.
    pub fn pop_sequence(&self, values: &[Value], schema: &str, slots: &mut [Slot<'_>]) -> Result<()> {
        let schema = Schema::parse_with_limit(schema, self.max_depth)?;
        self.pop_schema(values, &schema, slots)
    }

    /// Pop against an already parsed schema
    pub fn pop_schema(&self, values: &[Value], schema: &Schema, slots: &mut [Slot<'_>]) -> Result<()> {
        check_arity(&schema.leaves(), slots.iter().map(Slot::tag))?;

        let nil = Value::Nil;
        let numbered = schema.len() > 1;
        let mut walk = PopWalk {
            marshaller: self,
            slots: slots.iter_mut(),
            taken: 0,
        };

        for (i, directive) in schema.directives().iter().enumerate() {
            let path = if numbered {
                KeyPath::arg(i + 1)
            } else {
                KeyPath::root()
            };
            let value = values.get(i).unwrap_or(&nil);

            if let Err(err) = walk.directive(directive, value, &path, 1) {
                self.logger
                    .log(Level::ERROR, err.path().unwrap_or_default(), &err.to_string());
                return Err(err);
            }
        }
        Ok(())
    }
}

struct PopWalk<'m, 'r, 's, 'b> {
    marshaller: &'m Marshaller<'r>,
    slots: IterMut<'s, Slot<'b>>,
    taken: usize,
}

impl<'s, 'b> PopWalk<'_, '_, 's, 'b> {
    fn next_slot(&mut self) -> Result<&'s mut Slot<'b>> {
        let index = self.taken;
        self.taken += 1;
        self.slots.next().ok_or(Error::Arity {
            index,
            expected: None,
            found: None,
        })
    }

    fn directive(&mut self, directive: &Directive, value: &Value, path: &KeyPath, depth: usize) -> Result<()> {
        if depth > self.marshaller.max_depth {
            return Err(Error::RecursionLimit {
                limit: self.marshaller.max_depth,
            });
        }

        match directive {
            Directive::Leaf(_) => {
                let slot = self.next_slot()?;
                match self.extract(slot, value, path) {
                    Ok(()) => Ok(()),
                    Err(err) => {
                        self.recover(err)?;
                        slot.reset();
                        Ok(())
                    }
                }
            }
            Directive::Table(pairs) => {
                let table = match value {
                    Value::Table(table) => table,
                    other => {
                        let err = Error::mismatch(path, "table", other.type_name());
                        return self.default_subtree(directive, path, err);
                    }
                };

                for (key, child) in pairs {
                    let child_path = path.child(key.clone());
                    match table.get(key) {
                        Some(found) => self.directive(child, found, &child_path, depth + 1)?,
                        None => {
                            let err = Error::MissingKey {
                                path: child_path.to_string(),
                                key: key.to_string(),
                            };
                            self.default_subtree(child, &child_path, err)?;
                        }
                    }
                }
                Ok(())
            }
        }
    }

    /// Convert `value` into the slot, or fail without touching it
    fn extract(&self, slot: &mut Slot<'_>, value: &Value, path: &KeyPath) -> Result<()> {
        let at = |err: Error| err.at(path);
        let out_of_range = |value: i64, target: &'static str| Error::OutOfRange {
            path: path.to_string(),
            value: value.to_string(),
            target,
        };

        match slot {
            Slot::Bool(out) => **out = value.as_bool().map_err(at)?,
            Slot::Int(out) => **out = value.as_i64().map_err(at)?,
            Slot::Int32(out) => {
                let i = value.as_i64().map_err(at)?;
                **out = i32::try_from(i).map_err(|_| out_of_range(i, "i32"))?;
            }
            Slot::UInt32(out) => {
                let i = value.as_i64().map_err(at)?;
                **out = u32::try_from(i).map_err(|_| out_of_range(i, "u32"))?;
            }
            Slot::Float(out) => **out = value.as_f64().map_err(at)?,
            Slot::Float32(out) => {
                let f = value.as_f64().map_err(at)?;
                let narrowed = f as f32;
                if f.is_finite() && !narrowed.is_finite() {
                    return Err(Error::OutOfRange {
                        path: path.to_string(),
                        value: f.to_string(),
                        target: "f32",
                    });
                }
                **out = narrowed;
            }
            Slot::String(out) => **out = value.to_lua_string().map_err(at)?,
            Slot::Callable(out) => match value {
                Value::Callable(callable) => {
                    **out = Some(self.marshaller.registry.register(callable.clone()));
                }
                other => return Err(Error::mismatch(path, "function", other.type_name())),
            },
            Slot::Opaque(out) => match value {
                Value::Opaque(opaque) => **out = Some(opaque.clone()),
                other => return Err(Error::mismatch(path, "userdata", other.type_name())),
            },
        }
        Ok(())
    }

    /// Pass `err` through unless the policy allows replacing it with a default
    fn recover(&self, err: Error) -> Result<()> {
        if self.marshaller.policy == Policy::Lenient && err.is_recoverable() {
            self.marshaller.logger.log(
                Level::WARN,
                err.path().unwrap_or_default(),
                &format!("{}; using default", err),
            );
            Ok(())
        } else {
            Err(err)
        }
    }

    /// Default every leaf under `directive` after a table-level failure,
    /// logging one warning per leaf
    fn default_subtree(&mut self, directive: &Directive, path: &KeyPath, err: Error) -> Result<()> {
        if self.marshaller.policy == Policy::Strict || !err.is_recoverable() {
            return Err(err);
        }
        let reason = err.to_string();
        self.default_leaves(directive, path, &reason)
    }

    fn default_leaves(&mut self, directive: &Directive, path: &KeyPath, reason: &str) -> Result<()> {
        match directive {
            Directive::Leaf(_) => {
                self.next_slot()?.reset();
                self.marshaller.logger.log(
                    Level::WARN,
                    &path.to_string(),
                    &format!("{}; using default", reason),
                );
            }
            Directive::Table(pairs) => {
                for (key, child) in pairs {
                    self.default_leaves(child, &path.child(key.clone()), reason)?;
                }
            }
        }
        Ok(())
    }
}
