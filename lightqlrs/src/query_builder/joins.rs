use std::collections::{BTreeSet, HashMap};

use crate::dialect::Dialect;
use crate::error::{LightqlError, Result};
use crate::explores::{field_id, Explore, JoinType};

use super::fields::FieldMap;
use super::templates::{parenthesize, substitute};

/// A join whose ON template has been substituted for one dialect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledJoin {
    pub table: String,
    pub join_type: JoinType,
    pub sql_on: String,
    /// Tables the ON condition reads, excluding the joined table itself.
    pub depends_on: BTreeSet<String>,
}

/// Tables a query needs, base table first, with the JOINs to emit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedJoins {
    pub tables: Vec<String>,
    pub joins: Vec<CompiledJoin>,
}

/// Compute the minimal set of tables covering `referenced_tables` and the
/// order in which their JOINs can be emitted.
pub fn resolve_required_tables(
    explore: &Explore,
    referenced_tables: &BTreeSet<String>,
    fields: &FieldMap,
    dialect: &dyn Dialect,
) -> Result<ResolvedJoins> {
    JoinGraph::build(explore, fields, dialect)?.resolve(referenced_tables)
}

/// Explicit adjacency structure over the explore's tables. Node 0 is the
/// base table; join nodes follow in declaration order.
#[derive(Debug, Clone)]
pub struct JoinGraph {
    explore: String,
    tables: Vec<String>,
    joins: Vec<Option<CompiledJoin>>,
    index: HashMap<String, usize>,
    depends_on: Vec<Vec<usize>>,
    /// Edge `dep -> node` for every table a node's ON condition references.
    dependents: Vec<Vec<usize>>,
}

impl JoinGraph {
    pub fn build(explore: &Explore, fields: &FieldMap, dialect: &dyn Dialect) -> Result<Self> {
        if !explore.tables.contains_key(&explore.base_table) {
            return Err(LightqlError::Join(format!(
                "base table {} is not a table of explore {}",
                explore.base_table, explore.name
            )));
        }
        let mut tables = vec![explore.base_table.clone()];
        let mut index = HashMap::from([(explore.base_table.clone(), 0usize)]);
        for join in &explore.joins {
            if !explore.tables.contains_key(&join.table) {
                return Err(LightqlError::Join(format!(
                    "explore {} joins unknown table {}",
                    explore.name, join.table
                )));
            }
            if index.contains_key(&join.table) {
                return Err(LightqlError::Join(format!(
                    "table {} is joined more than once in explore {}",
                    join.table, explore.name
                )));
            }
            index.insert(join.table.clone(), tables.len());
            tables.push(join.table.clone());
        }

        let mut joins = vec![None];
        let mut depends_on = vec![Vec::new()];
        let mut dependents = vec![Vec::new(); tables.len()];
        for (offset, join) in explore.joins.iter().enumerate() {
            let node = offset + 1;
            let mut refs = BTreeSet::new();
            let sql_on = substitute(&join.sql_on, |p| {
                if p.is_table_keyword() {
                    return Ok(dialect.quote_ident(&join.table));
                }
                match p.qualifier {
                    Some(table) => {
                        if !index.contains_key(table) {
                            return Err(LightqlError::Join(format!(
                                "join {} references unknown table {table}",
                                join.table
                            )));
                        }
                        let field = fields
                            .get(&field_id(table, p.name))
                            .filter(|f| f.is_dimension() && f.table == table)
                            .ok_or_else(|| {
                                LightqlError::Join(format!(
                                    "join {} references unknown dimension {p}",
                                    join.table
                                ))
                            })?;
                        refs.extend(field.tables_references.iter().cloned());
                        Ok(parenthesize(&field.sql))
                    }
                    None if index.contains_key(p.name) => {
                        refs.insert(p.name.to_string());
                        Ok(dialect.quote_ident(p.name))
                    }
                    None => Err(LightqlError::Join(format!(
                        "join {} references unknown table {p}",
                        join.table
                    ))),
                }
            })?;
            refs.remove(&join.table);

            let mut deps = Vec::with_capacity(refs.len());
            for table in &refs {
                let dep = *index.get(table).ok_or_else(|| {
                    LightqlError::Join(format!(
                        "join {} depends on table {table} which is not joined in explore {}",
                        join.table, explore.name
                    ))
                })?;
                deps.push(dep);
                dependents[dep].push(node);
            }
            // An ON condition reading no other table hangs off the base table.
            if deps.is_empty() {
                deps.push(0);
                dependents[0].push(node);
            }
            depends_on.push(deps);
            joins.push(Some(CompiledJoin {
                table: join.table.clone(),
                join_type: join.join_type,
                sql_on,
                depends_on: refs,
            }));
        }

        Ok(Self {
            explore: explore.name.clone(),
            tables,
            joins,
            index,
            depends_on,
            dependents,
        })
    }

    /// BFS depth of every node from the base table, with the predecessor
    /// the path came through. Frontiers are walked in ascending node order
    /// so the earliest-declared predecessor wins between equal-length paths.
    fn traverse(&self) -> (Vec<Option<usize>>, Vec<Option<usize>>) {
        let mut depth = vec![None; self.tables.len()];
        let mut parent = vec![None; self.tables.len()];
        depth[0] = Some(0);
        let mut frontier = vec![0usize];
        let mut level = 0;
        while !frontier.is_empty() {
            level += 1;
            let mut next = Vec::new();
            for &node in &frontier {
                for &child in &self.dependents[node] {
                    if depth[child].is_none() {
                        depth[child] = Some(level);
                        parent[child] = Some(node);
                        next.push(child);
                    }
                }
            }
            next.sort_unstable();
            frontier = next;
        }
        (depth, parent)
    }

    pub fn resolve(&self, referenced_tables: &BTreeSet<String>) -> Result<ResolvedJoins> {
        let (depth, parent) = self.traverse();

        let mut stack = vec![0usize];
        for table in referenced_tables {
            let node = *self.index.get(table).ok_or_else(|| {
                LightqlError::Join(format!(
                    "table {table} is not joined in explore {}",
                    self.explore
                ))
            })?;
            stack.push(node);
        }

        let mut required = BTreeSet::new();
        while let Some(node) = stack.pop() {
            if !required.insert(node) {
                continue;
            }
            if depth[node].is_none() {
                return Err(LightqlError::Join(format!(
                    "table {} is not reachable from base table {} in explore {}",
                    self.tables[node], self.tables[0], self.explore
                )));
            }
            if let Some(p) = parent[node] {
                stack.push(p);
            }
            stack.extend(self.depends_on[node].iter().copied());
        }

        // Kahn's algorithm restricted to the required nodes.
        let mut pending: HashMap<usize, usize> = required
            .iter()
            .map(|&n| (n, self.depends_on[n].len()))
            .collect();
        let mut ready: BTreeSet<(usize, usize)> = pending
            .iter()
            .filter(|(_, count)| **count == 0)
            .map(|(&n, _)| (depth[n].unwrap_or(usize::MAX), n))
            .collect();
        let mut order = Vec::with_capacity(required.len());
        while let Some(entry) = ready.pop_first() {
            let node = entry.1;
            order.push(node);
            for &child in &self.dependents[node] {
                if let Some(count) = pending.get_mut(&child) {
                    *count -= 1;
                    if *count == 0 {
                        ready.insert((depth[child].unwrap_or(usize::MAX), child));
                    }
                }
            }
        }
        if order.len() != required.len() {
            let stuck: Vec<&str> = required
                .iter()
                .filter(|n| !order.contains(n))
                .map(|&n| self.tables[n].as_str())
                .collect();
            return Err(LightqlError::Join(format!(
                "join conditions in explore {} form a cycle between {}",
                self.explore,
                stuck.join(", ")
            )));
        }

        let tables: Vec<String> = order.iter().map(|&n| self.tables[n].clone()).collect();
        let joins: Vec<CompiledJoin> = order
            .iter()
            .filter_map(|&n| self.joins[n].clone())
            .collect();
        tracing::debug!(explore = %self.explore, tables = ?tables, "resolved join order");
        Ok(ResolvedJoins { tables, joins })
    }
}
