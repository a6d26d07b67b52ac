//
// Copyright (c) 2024 Nathan Fiedler
//
use crate::data::sources::EntityDataSource;
use crate::domain::criteria::{Criteria, Direction, Predicate, Visibility};
use crate::domain::entities::{Columns, Entity, Page, Record};
use crate::domain::query::{Boolean, Query};
use crate::Error;
use log::{debug, warn};
use serde_json::Value;
use std::mem;
use std::sync::Arc;

///
/// Repository over the rows of one table.
///
/// Chainable methods record query directives without touching the store.
/// Each terminal operation takes the recorded directives, leaving the
/// repository blank, compiles them onto a fresh query from the data source,
/// and executes it.
///
pub struct Repository {
    datasource: Arc<dyn EntityDataSource>,
    criteria: Criteria,
}

impl Repository {
    ///
    /// Construct a repository for the given data source.
    ///
    /// Returns `Error::Configuration` if the data source does not support
    /// persistence, querying, and soft deletes.
    ///
    pub fn new(datasource: Arc<dyn EntityDataSource>) -> Result<Self, Error> {
        let missing = datasource.capabilities().missing();
        if !missing.is_empty() {
            let table = datasource.new_query().table().to_owned();
            warn!("data source for {} lacks {}", table, missing.join(", "));
            return Err(Error::Configuration(format!(
                "data source for {} must support {}",
                table,
                missing.join(", ")
            )));
        }
        Ok(Self {
            datasource,
            criteria: Criteria::default(),
        })
    }

    /// Include soft-deleted rows in the next terminal operation.
    pub fn with_trashed(&mut self) -> &mut Self {
        self.criteria.with_trashed();
        self
    }

    /// Return only soft-deleted rows from the next terminal operation.
    pub fn only_trashed(&mut self) -> &mut Self {
        self.criteria.only_trashed();
        self
    }

    /// Add a conjunctive filter.
    pub fn and_where(&mut self, predicate: Predicate) -> &mut Self {
        self.criteria.and_where(predicate);
        self
    }

    /// Add a disjunctive filter.
    pub fn or_where(&mut self, predicate: Predicate) -> &mut Self {
        self.criteria.or_where(predicate);
        self
    }

    /// Set the row offset; the last call wins.
    pub fn skip(&mut self, offset: u64) -> &mut Self {
        self.criteria.skip(offset);
        self
    }

    /// Set the row limit; the last call wins.
    pub fn take(&mut self, limit: u64) -> &mut Self {
        self.criteria.take(limit);
        self
    }

    /// Append a sort key after any already recorded.
    pub fn order_by<F: Into<String>>(&mut self, field: F, direction: Direction) -> &mut Self {
        self.criteria.order_by(field, direction);
        self
    }

    /// Directives recorded since the last terminal operation.
    pub fn pending(&self) -> &Criteria {
        &self.criteria
    }

    ///
    /// Retrieve all rows matching the recorded directives.
    ///
    pub fn all<C: Into<Columns>>(&mut self, columns: C) -> Result<Vec<Entity>, Error> {
        let criteria = self.take_criteria();
        let mut query = self.datasource.new_query();
        apply_trashed(&mut query, &criteria);
        apply_where(&mut query, &criteria);
        apply_take_and_skip(&mut query, &criteria)?;
        apply_order_by(&mut query, &criteria);
        debug!("all: {:?}", query);
        self.datasource.get(&query, &columns.into())
    }

    ///
    /// Retrieve the given 1-based page of matching rows. Any recorded skip
    /// and take are ignored in favor of the page bounds.
    ///
    pub fn paginate<C: Into<Columns>>(
        &mut self,
        per_page: u64,
        page: u64,
        columns: C,
    ) -> Result<Page, Error> {
        let criteria = self.take_criteria();
        if per_page == 0 {
            return Err(Error::InvalidArgument("per_page must be positive".into()));
        }
        let mut query = self.datasource.new_query();
        apply_trashed(&mut query, &criteria);
        apply_where(&mut query, &criteria);
        apply_order_by(&mut query, &criteria);
        debug!("paginate: {:?}", query);
        self.datasource
            .paginate(&query, per_page, page.max(1), &columns.into())
    }

    /// Insert a new row and return it as stored.
    pub fn create(&mut self, data: Record) -> Result<Entity, Error> {
        self.take_criteria();
        self.datasource.create(&data)
    }

    ///
    /// Apply `data` to every row whose `attribute` equals `id`, returning the
    /// number of rows affected. Soft-deleted rows are only touched when
    /// `with_soft_del` is `true` and trashed rows were requested.
    ///
    pub fn update<V: Into<Value>>(
        &mut self,
        data: Record,
        id: V,
        attribute: &str,
        with_soft_del: bool,
    ) -> Result<u64, Error> {
        let criteria = self.take_criteria();
        let mut query = self.datasource.new_query();
        if with_soft_del {
            apply_trashed(&mut query, &criteria);
        }
        query.and_where(&Predicate::eq(attribute, id));
        debug!("update: {:?}", query);
        self.datasource.update(&query, &data)
    }

    /// Soft-delete the row with the given primary key.
    pub fn delete<V: Into<Value>>(&mut self, id: V) -> Result<u64, Error> {
        self.take_criteria();
        self.datasource.destroy(&id.into())
    }

    ///
    /// Permanently remove the row with the given primary key, which must be
    /// visible under the recorded soft-delete visibility.
    ///
    pub fn force_delete<V: Into<Value>>(&mut self, id: V) -> Result<u64, Error> {
        let criteria = self.take_criteria();
        let id = id.into();
        self.find_with(&criteria, &id, &Columns::all())?;
        self.datasource.force_delete(&id)
    }

    /// Retrieve the row with the given primary key.
    pub fn find<V: Into<Value>, C: Into<Columns>>(
        &mut self,
        id: V,
        columns: C,
    ) -> Result<Entity, Error> {
        let criteria = self.take_criteria();
        self.find_with(&criteria, &id.into(), &columns.into())
    }

    /// Retrieve the first row whose `field` equals `value`.
    pub fn find_by<V: Into<Value>, C: Into<Columns>>(
        &mut self,
        field: &str,
        value: V,
        columns: C,
    ) -> Result<Entity, Error> {
        let criteria = self.take_criteria();
        let mut query = self.datasource.new_query();
        apply_trashed(&mut query, &criteria);
        query.and_where(&Predicate::eq(field, value));
        debug!("find_by: {:?}", query);
        self.datasource.first_or_fail(&query, &columns.into())
    }

    /// Retrieve every row whose `field` equals `value`, in recorded order.
    pub fn find_all_by<V: Into<Value>, C: Into<Columns>>(
        &mut self,
        field: &str,
        value: V,
        columns: C,
    ) -> Result<Vec<Entity>, Error> {
        let criteria = self.take_criteria();
        let mut query = self.datasource.new_query();
        apply_trashed(&mut query, &criteria);
        apply_order_by(&mut query, &criteria);
        query.and_where(&Predicate::eq(field, value));
        debug!("find_all_by: {:?}", query);
        self.datasource.get(&query, &columns.into())
    }

    /// Retrieve the first row matching the recorded filters.
    pub fn first_or_fail<C: Into<Columns>>(&mut self, columns: C) -> Result<Entity, Error> {
        let criteria = self.take_criteria();
        let mut query = self.datasource.new_query();
        apply_trashed(&mut query, &criteria);
        apply_where(&mut query, &criteria);
        debug!("first_or_fail: {:?}", query);
        self.datasource.first_or_fail(&query, &columns.into())
    }

    fn find_with(&self, criteria: &Criteria, id: &Value, columns: &Columns) -> Result<Entity, Error> {
        let mut query = self.datasource.new_query();
        apply_trashed(&mut query, criteria);
        debug!("find: {:?}", query);
        self.datasource.find_or_fail(&query, id, columns)
    }

    fn take_criteria(&mut self) -> Criteria {
        mem::take(&mut self.criteria)
    }
}

fn apply_trashed(query: &mut Query, criteria: &Criteria) {
    match criteria.visibility() {
        Visibility::WithTrashed => {
            query.with_trashed();
        }
        Visibility::OnlyTrashed => {
            query.only_trashed();
        }
        Visibility::WithoutTrashed => {}
    }
}

//
// All recorded predicates go into a single group so that anything appended
// afterward constrains the whole disjunction. When disjunctions are present
// the soft-delete intent is restated outside of that group.
//
fn apply_where(query: &mut Query, criteria: &Criteria) {
    query.where_nested(Boolean::And, |group| {
        for predicate in criteria.wheres() {
            group.and_where(predicate);
        }
        for predicate in criteria.or_wheres() {
            group.or_where(predicate);
        }
    });
    if criteria.or_wheres().is_empty() {
        return;
    }
    if let Some(deleted_at) = query.deleted_at_column().map(str::to_owned) {
        match criteria.visibility() {
            Visibility::WithTrashed => {
                query.where_nested(Boolean::And, |group| {
                    group
                        .where_null(deleted_at.as_str())
                        .or_where_not_null(deleted_at.as_str());
                });
            }
            Visibility::OnlyTrashed => {
                query.where_not_null(deleted_at);
            }
            Visibility::WithoutTrashed => {}
        }
    }
}

fn apply_take_and_skip(query: &mut Query, criteria: &Criteria) -> Result<(), Error> {
    if let Some(offset) = criteria.skip_value() {
        query.skip(offset);
    }
    if let Some(limit) = criteria.take_value() {
        if limit == 0 {
            return Err(Error::InvalidArgument("take must be positive".into()));
        }
        query.take(limit);
    }
    Ok(())
}

fn apply_order_by(query: &mut Query, criteria: &Criteria) {
    for (field, direction) in criteria.orders() {
        query.order_by(field.as_str(), *direction);
    }
}
