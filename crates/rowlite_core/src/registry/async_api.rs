//! Async mirror of the store surface.
//!
//! Every operation resolves its controller on the calling thread, then
//! runs on the registry's worker pool and hands the [`StoreResult`] to a
//! [`StoreCallback`] according to the given [`DeliveryOptions`]. A
//! resolution failure is delivered the same way, so a callback always
//! fires exactly once (unless its delivery is guarded and the owner is
//! gone).
//!
//! Jobs keep their controller alive rather than the registry, so
//! operations already queued when the last registry handle drops still
//! run to completion before the pool joins.

use rowlite_engine::{ColumnMap, Engine, Rows, Value};

use super::StoreRegistry;
use crate::callback::{deliver, DeliveryOptions, StoreCallback};
use crate::error::{StoreError, StoreResult};

impl StoreRegistry {
    fn run_async<T: Send + 'static>(
        &self,
        options: DeliveryOptions,
        callback: Box<dyn StoreCallback<T>>,
        job: impl FnOnce() -> StoreResult<T> + Send + 'static,
    ) {
        self.inner.worker.submit(Box::new(move || {
            deliver(options, callback, job());
        }));
    }

    /// Async [`try_has`](Self::try_has).
    pub fn has_async<R, C>(&self, key: Value, options: DeliveryOptions, callback: C)
    where
        R: Send + 'static,
        C: StoreCallback<bool> + 'static,
    {
        let callback: Box<dyn StoreCallback<bool>> = Box::new(callback);
        match self.resolve_keyed::<R>() {
            Ok(controller) => self.run_async(options, callback, move || controller.has_key(&key)),
            Err(err) => deliver(options, callback, Err(err)),
        }
    }

    /// Async [`try_has_where`](Self::try_has_where).
    pub fn has_where_async<R, C>(
        &self,
        clause: &str,
        args: Vec<Value>,
        options: DeliveryOptions,
        callback: C,
    ) where
        R: Send + 'static,
        C: StoreCallback<bool> + 'static,
    {
        let callback: Box<dyn StoreCallback<bool>> = Box::new(callback);
        let clause = clause.to_string();
        match self.resolve_keyed::<R>() {
            Ok(controller) => {
                self.run_async(options, callback, move || {
                    controller.has_where(&clause, &args)
                });
            }
            Err(err) => deliver(options, callback, Err(err)),
        }
    }

    /// Async [`try_query`](Self::try_query).
    pub fn query_async<R, C>(&self, key: Value, options: DeliveryOptions, callback: C)
    where
        R: Send + 'static,
        C: StoreCallback<Option<R>> + 'static,
    {
        let callback: Box<dyn StoreCallback<Option<R>>> = Box::new(callback);
        match self.resolve_read::<R>() {
            Ok(controller) => self.run_async(options, callback, move || controller.find(&key)),
            Err(err) => deliver(options, callback, Err(err)),
        }
    }

    /// Async [`try_query_first`](Self::try_query_first).
    pub fn query_first_async<R, C>(
        &self,
        clause: &str,
        args: Vec<Value>,
        options: DeliveryOptions,
        callback: C,
    ) where
        R: Send + 'static,
        C: StoreCallback<Option<R>> + 'static,
    {
        let callback: Box<dyn StoreCallback<Option<R>>> = Box::new(callback);
        let clause = clause.to_string();
        match self.resolve_read::<R>() {
            Ok(controller) => {
                self.run_async(options, callback, move || {
                    controller.find_first(&clause, &args)
                });
            }
            Err(err) => deliver(options, callback, Err(err)),
        }
    }

    /// Async [`try_query_where`](Self::try_query_where).
    pub fn query_where_async<R, C>(
        &self,
        clause: &str,
        args: Vec<Value>,
        options: DeliveryOptions,
        callback: C,
    ) where
        R: Send + 'static,
        C: StoreCallback<Vec<R>> + 'static,
    {
        let callback: Box<dyn StoreCallback<Vec<R>>> = Box::new(callback);
        let clause = clause.to_string();
        match self.resolve_read::<R>() {
            Ok(controller) => {
                self.run_async(options, callback, move || {
                    controller.find_where(&clause, &args)
                });
            }
            Err(err) => deliver(options, callback, Err(err)),
        }
    }

    /// Async [`try_query_where`](Self::try_query_where) with a processing
    /// stage.
    ///
    /// `process` runs on the worker thread between the query and the
    /// delivery, so heavier shaping stays off the delivering thread.
    pub fn query_where_async_with<R, T, P, C>(
        &self,
        clause: &str,
        args: Vec<Value>,
        process: P,
        options: DeliveryOptions,
        callback: C,
    ) where
        R: Send + 'static,
        T: Send + 'static,
        P: FnOnce(Vec<R>) -> T + Send + 'static,
        C: StoreCallback<T> + 'static,
    {
        let callback: Box<dyn StoreCallback<T>> = Box::new(callback);
        let clause = clause.to_string();
        match self.resolve_read::<R>() {
            Ok(controller) => {
                self.run_async(options, callback, move || {
                    controller.find_where(&clause, &args).map(process)
                });
            }
            Err(err) => deliver(options, callback, Err(err)),
        }
    }

    /// Async [`try_query_all`](Self::try_query_all).
    pub fn query_all_async<R, C>(&self, options: DeliveryOptions, callback: C)
    where
        R: Send + 'static,
        C: StoreCallback<Vec<R>> + 'static,
    {
        let callback: Box<dyn StoreCallback<Vec<R>>> = Box::new(callback);
        match self.resolve_read::<R>() {
            Ok(controller) => self.run_async(options, callback, move || controller.find_all()),
            Err(err) => deliver(options, callback, Err(err)),
        }
    }

    /// Async [`try_count`](Self::try_count).
    pub fn count_async<R, C>(
        &self,
        clause: Option<&str>,
        args: Vec<Value>,
        options: DeliveryOptions,
        callback: C,
    ) where
        R: Send + 'static,
        C: StoreCallback<i64> + 'static,
    {
        let callback: Box<dyn StoreCallback<i64>> = Box::new(callback);
        let clause = clause.map(str::to_string);
        match self.resolve_keyed::<R>() {
            Ok(controller) => {
                self.run_async(options, callback, move || {
                    controller.count(clause.as_deref(), &args)
                });
            }
            Err(err) => deliver(options, callback, Err(err)),
        }
    }

    /// Async [`try_insert`](Self::try_insert).
    pub fn insert_async<R, C>(&self, record: R, options: DeliveryOptions, callback: C)
    where
        R: Send + 'static,
        C: StoreCallback<i64> + 'static,
    {
        let callback: Box<dyn StoreCallback<i64>> = Box::new(callback);
        match self.resolve_record(record) {
            Ok((controller, record)) => {
                self.run_async(options, callback, move || controller.insert_boxed(record));
            }
            Err(err) => deliver(options, callback, Err(err)),
        }
    }

    /// Async [`try_update`](Self::try_update).
    pub fn update_async<R, C>(&self, record: R, options: DeliveryOptions, callback: C)
    where
        R: Send + 'static,
        C: StoreCallback<bool> + 'static,
    {
        let callback: Box<dyn StoreCallback<bool>> = Box::new(callback);
        match self.resolve_record(record) {
            Ok((controller, record)) => {
                self.run_async(options, callback, move || controller.update_boxed(record));
            }
            Err(err) => deliver(options, callback, Err(err)),
        }
    }

    /// Async [`try_update_where`](Self::try_update_where).
    pub fn update_where_async<R, C>(
        &self,
        record: R,
        clause: &str,
        args: Vec<Value>,
        options: DeliveryOptions,
        callback: C,
    ) where
        R: Send + 'static,
        C: StoreCallback<bool> + 'static,
    {
        let callback: Box<dyn StoreCallback<bool>> = Box::new(callback);
        let clause = clause.to_string();
        match self.resolve_record(record) {
            Ok((controller, record)) => {
                self.run_async(options, callback, move || {
                    controller.update_where_boxed(record, &clause, &args)
                });
            }
            Err(err) => deliver(options, callback, Err(err)),
        }
    }

    /// Async [`try_update_values`](Self::try_update_values).
    pub fn update_values_async<R, C>(
        &self,
        changes: ColumnMap,
        clause: Option<&str>,
        args: Vec<Value>,
        options: DeliveryOptions,
        callback: C,
    ) where
        R: Send + 'static,
        C: StoreCallback<bool> + 'static,
    {
        let callback: Box<dyn StoreCallback<bool>> = Box::new(callback);
        let clause = clause.map(str::to_string);
        match self.resolve_keyed::<R>() {
            Ok(controller) => {
                self.run_async(options, callback, move || {
                    controller.update_values(&changes, clause.as_deref(), &args)
                });
            }
            Err(err) => deliver(options, callback, Err(err)),
        }
    }

    /// Async [`try_update_keys`](Self::try_update_keys).
    pub fn update_keys_async<R, C>(
        &self,
        keys: Vec<Value>,
        changes: ColumnMap,
        options: DeliveryOptions,
        callback: C,
    ) where
        R: Send + 'static,
        C: StoreCallback<bool> + 'static,
    {
        let callback: Box<dyn StoreCallback<bool>> = Box::new(callback);
        match self.resolve_keyed::<R>() {
            Ok(controller) => {
                self.run_async(options, callback, move || {
                    controller.update_keys(&keys, &changes)
                });
            }
            Err(err) => deliver(options, callback, Err(err)),
        }
    }

    /// Async [`try_insert_or_update`](Self::try_insert_or_update).
    pub fn insert_or_update_async<R, C>(&self, record: R, options: DeliveryOptions, callback: C)
    where
        R: Send + 'static,
        C: StoreCallback<bool> + 'static,
    {
        let callback: Box<dyn StoreCallback<bool>> = Box::new(callback);
        match self.resolve_record(record) {
            Ok((controller, record)) => {
                self.run_async(options, callback, move || {
                    controller.insert_or_update_boxed(record)
                });
            }
            Err(err) => deliver(options, callback, Err(err)),
        }
    }

    /// Async [`try_insert_or_update_where`](Self::try_insert_or_update_where).
    pub fn insert_or_update_where_async<R, C>(
        &self,
        record: R,
        clause: &str,
        args: Vec<Value>,
        options: DeliveryOptions,
        callback: C,
    ) where
        R: Send + 'static,
        C: StoreCallback<bool> + 'static,
    {
        let callback: Box<dyn StoreCallback<bool>> = Box::new(callback);
        let clause = clause.to_string();
        match self.resolve_record(record) {
            Ok((controller, record)) => {
                self.run_async(options, callback, move || {
                    controller.insert_or_update_where_boxed(record, &clause, &args)
                });
            }
            Err(err) => deliver(options, callback, Err(err)),
        }
    }

    /// Async [`try_delete`](Self::try_delete).
    pub fn delete_async<R, C>(&self, record: R, options: DeliveryOptions, callback: C)
    where
        R: Send + 'static,
        C: StoreCallback<bool> + 'static,
    {
        let callback: Box<dyn StoreCallback<bool>> = Box::new(callback);
        match self.resolve_record(record) {
            Ok((controller, record)) => {
                self.run_async(options, callback, move || controller.delete_boxed(record));
            }
            Err(err) => deliver(options, callback, Err(err)),
        }
    }

    /// Async [`try_delete_key`](Self::try_delete_key).
    pub fn delete_key_async<R, C>(&self, key: Value, options: DeliveryOptions, callback: C)
    where
        R: Send + 'static,
        C: StoreCallback<bool> + 'static,
    {
        let callback: Box<dyn StoreCallback<bool>> = Box::new(callback);
        match self.resolve_keyed::<R>() {
            Ok(controller) => {
                self.run_async(options, callback, move || controller.delete_key(&key));
            }
            Err(err) => deliver(options, callback, Err(err)),
        }
    }

    /// Async [`try_delete_keys`](Self::try_delete_keys).
    pub fn delete_keys_async<R, C>(&self, keys: Vec<Value>, options: DeliveryOptions, callback: C)
    where
        R: Send + 'static,
        C: StoreCallback<bool> + 'static,
    {
        let callback: Box<dyn StoreCallback<bool>> = Box::new(callback);
        match self.resolve_keyed::<R>() {
            Ok(controller) => {
                self.run_async(options, callback, move || controller.delete_keys(&keys));
            }
            Err(err) => deliver(options, callback, Err(err)),
        }
    }

    /// Async [`try_delete_where`](Self::try_delete_where).
    pub fn delete_where_async<R, C>(
        &self,
        clause: &str,
        args: Vec<Value>,
        options: DeliveryOptions,
        callback: C,
    ) where
        R: Send + 'static,
        C: StoreCallback<bool> + 'static,
    {
        let callback: Box<dyn StoreCallback<bool>> = Box::new(callback);
        let clause = clause.to_string();
        match self.resolve_keyed::<R>() {
            Ok(controller) => {
                self.run_async(options, callback, move || {
                    controller.delete_where(Some(&clause), &args)
                });
            }
            Err(err) => deliver(options, callback, Err(err)),
        }
    }

    /// Async [`try_delete_all`](Self::try_delete_all).
    pub fn delete_all_async<R, C>(&self, options: DeliveryOptions, callback: C)
    where
        R: Send + 'static,
        C: StoreCallback<bool> + 'static,
    {
        let callback: Box<dyn StoreCallback<bool>> = Box::new(callback);
        match self.resolve_keyed::<R>() {
            Ok(controller) => {
                self.run_async(options, callback, move || controller.delete_where(None, &[]));
            }
            Err(err) => deliver(options, callback, Err(err)),
        }
    }

    /// Async [`try_batch_insert`](Self::try_batch_insert).
    pub fn batch_insert_async<R, C>(&self, records: Vec<R>, options: DeliveryOptions, callback: C)
    where
        R: Send + 'static,
        C: StoreCallback<()> + 'static,
    {
        let callback: Box<dyn StoreCallback<()>> = Box::new(callback);
        match self.resolve_records(records) {
            Ok((controller, records)) => {
                self.run_async(options, callback, move || {
                    controller.batch_insert_boxed(records)
                });
            }
            Err(err) => deliver(options, callback, Err(err)),
        }
    }

    /// Async [`try_batch_update`](Self::try_batch_update).
    pub fn batch_update_async<R, C>(&self, records: Vec<R>, options: DeliveryOptions, callback: C)
    where
        R: Send + 'static,
        C: StoreCallback<()> + 'static,
    {
        let callback: Box<dyn StoreCallback<()>> = Box::new(callback);
        match self.resolve_records(records) {
            Ok((controller, records)) => {
                self.run_async(options, callback, move || {
                    controller.batch_update_boxed(records)
                });
            }
            Err(err) => deliver(options, callback, Err(err)),
        }
    }

    /// Async [`try_batch_update_by`](Self::try_batch_update_by).
    pub fn batch_update_by_async<R, C>(
        &self,
        records: Vec<R>,
        column: &str,
        options: DeliveryOptions,
        callback: C,
    ) where
        R: Send + 'static,
        C: StoreCallback<()> + 'static,
    {
        let callback: Box<dyn StoreCallback<()>> = Box::new(callback);
        let column = column.to_string();
        match self.resolve_records(records) {
            Ok((controller, records)) => {
                self.run_async(options, callback, move || {
                    controller.batch_update_by_boxed(records, &column)
                });
            }
            Err(err) => deliver(options, callback, Err(err)),
        }
    }

    /// Async [`try_batch_update_where`](Self::try_batch_update_where).
    pub fn batch_update_where_async<R, C>(
        &self,
        records: Vec<R>,
        clause: &str,
        args: Vec<Value>,
        options: DeliveryOptions,
        callback: C,
    ) where
        R: Send + 'static,
        C: StoreCallback<()> + 'static,
    {
        let callback: Box<dyn StoreCallback<()>> = Box::new(callback);
        let clause = clause.to_string();
        match self.resolve_records(records) {
            Ok((controller, records)) => {
                self.run_async(options, callback, move || {
                    controller.batch_update_where_boxed(records, &clause, &args)
                });
            }
            Err(err) => deliver(options, callback, Err(err)),
        }
    }

    /// Async [`try_scalar_i64`](Self::try_scalar_i64).
    pub fn scalar_i64_async<R, C>(
        &self,
        projection: &str,
        clause: Option<&str>,
        args: Vec<Value>,
        options: DeliveryOptions,
        callback: C,
    ) where
        R: Send + 'static,
        C: StoreCallback<Option<i64>> + 'static,
    {
        let callback: Box<dyn StoreCallback<Option<i64>>> = Box::new(callback);
        let projection = projection.to_string();
        let clause = clause.map(str::to_string);
        match self.resolve_keyed::<R>() {
            Ok(controller) => {
                self.run_async(options, callback, move || {
                    controller.scalar_i64(&projection, clause.as_deref(), &args)
                });
            }
            Err(err) => deliver(options, callback, Err(err)),
        }
    }

    /// Async [`try_scalar_string`](Self::try_scalar_string).
    pub fn scalar_string_async<R, C>(
        &self,
        projection: &str,
        clause: Option<&str>,
        args: Vec<Value>,
        options: DeliveryOptions,
        callback: C,
    ) where
        R: Send + 'static,
        C: StoreCallback<Option<String>> + 'static,
    {
        let callback: Box<dyn StoreCallback<Option<String>>> = Box::new(callback);
        let projection = projection.to_string();
        let clause = clause.map(str::to_string);
        match self.resolve_keyed::<R>() {
            Ok(controller) => {
                self.run_async(options, callback, move || {
                    controller.scalar_string(&projection, clause.as_deref(), &args)
                });
            }
            Err(err) => deliver(options, callback, Err(err)),
        }
    }

    /// Async [`try_column_i64s`](Self::try_column_i64s).
    pub fn column_i64s_async<R, C>(
        &self,
        projection: &str,
        clause: Option<&str>,
        args: Vec<Value>,
        options: DeliveryOptions,
        callback: C,
    ) where
        R: Send + 'static,
        C: StoreCallback<Vec<i64>> + 'static,
    {
        let callback: Box<dyn StoreCallback<Vec<i64>>> = Box::new(callback);
        let projection = projection.to_string();
        let clause = clause.map(str::to_string);
        match self.resolve_keyed::<R>() {
            Ok(controller) => {
                self.run_async(options, callback, move || {
                    controller.column_i64s(&projection, clause.as_deref(), &args)
                });
            }
            Err(err) => deliver(options, callback, Err(err)),
        }
    }

    /// Async [`try_column_strings`](Self::try_column_strings).
    pub fn column_strings_async<R, C>(
        &self,
        projection: &str,
        clause: Option<&str>,
        args: Vec<Value>,
        options: DeliveryOptions,
        callback: C,
    ) where
        R: Send + 'static,
        C: StoreCallback<Vec<String>> + 'static,
    {
        let callback: Box<dyn StoreCallback<Vec<String>>> = Box::new(callback);
        let projection = projection.to_string();
        let clause = clause.map(str::to_string);
        match self.resolve_keyed::<R>() {
            Ok(controller) => {
                self.run_async(options, callback, move || {
                    controller.column_strings(&projection, clause.as_deref(), &args)
                });
            }
            Err(err) => deliver(options, callback, Err(err)),
        }
    }

    /// Async [`try_rows`](Self::try_rows).
    pub fn rows_async<R, C>(
        &self,
        projections: &[&str],
        clause: Option<&str>,
        args: Vec<Value>,
        options: DeliveryOptions,
        callback: C,
    ) where
        R: Send + 'static,
        C: StoreCallback<Rows> + 'static,
    {
        let callback: Box<dyn StoreCallback<Rows>> = Box::new(callback);
        let projections: Vec<String> = projections.iter().map(|p| p.to_string()).collect();
        let clause = clause.map(str::to_string);
        match self.resolve_keyed::<R>() {
            Ok(controller) => {
                self.run_async(options, callback, move || {
                    let refs: Vec<&str> = projections.iter().map(String::as_str).collect();
                    controller.rows(&refs, clause.as_deref(), &args)
                });
            }
            Err(err) => deliver(options, callback, Err(err)),
        }
    }

    /// Async [`try_raw_query`](Self::try_raw_query). Direct backend only.
    pub fn raw_query_async<C>(
        &self,
        statement: &str,
        args: Vec<Value>,
        options: DeliveryOptions,
        callback: C,
    ) where
        C: StoreCallback<Rows> + 'static,
    {
        let callback: Box<dyn StoreCallback<Rows>> = Box::new(callback);
        match self.direct_engine("raw statement execution") {
            Ok(engine) => {
                let engine = engine.clone();
                let statement = statement.to_string();
                self.run_async(options, callback, move || {
                    Ok(engine.raw_query(&statement, &args)?)
                });
            }
            Err(err) => deliver(options, callback, Err(err)),
        }
    }

    /// Async [`try_execute_transaction`](Self::try_execute_transaction).
    /// Direct backend only.
    pub fn execute_transaction_async<F, C>(&self, f: F, options: DeliveryOptions, callback: C)
    where
        F: FnOnce(&Engine) -> StoreResult<()> + Send + 'static,
        C: StoreCallback<()> + 'static,
    {
        let callback: Box<dyn StoreCallback<()>> = Box::new(callback);
        match self.direct_engine("execute_transaction") {
            Ok(engine) => {
                let engine = engine.clone();
                self.run_async(options, callback, move || {
                    let scope = engine.begin().map_err(StoreError::from)?;
                    f(&engine)?;
                    scope.commit().map_err(StoreError::from)?;
                    Ok(())
                });
            }
            Err(err) => deliver(options, callback, Err(err)),
        }
    }

    /// Async [`try_check_database_integrity`](Self::try_check_database_integrity).
    /// Direct backend only.
    ///
    /// Reconciles the tables registered at the time of the call.
    pub fn check_database_integrity_async<C>(&self, options: DeliveryOptions, callback: C)
    where
        C: StoreCallback<()> + 'static,
    {
        let callback: Box<dyn StoreCallback<()>> = Box::new(callback);
        let engine = match self.direct_engine("integrity check") {
            Ok(engine) => engine.clone(),
            Err(err) => {
                deliver(options, callback, Err(err));
                return;
            }
        };
        let controllers: Vec<_> = {
            let state = self.inner.state.lock();
            state
                .controllers
                .values()
                .map(|entry| entry.erased.clone())
                .collect()
        };
        self.run_async(options, callback, move || {
            let scope = engine.begin().map_err(StoreError::from)?;
            for controller in &controllers {
                controller.reconcile()?;
            }
            scope.commit().map_err(StoreError::from)?;
            Ok(())
        });
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc;
    use std::sync::Arc;
    use std::time::Duration;

    use super::super::fixtures::{user, User, UserMapper};
    use super::*;
    use crate::callback::{DeliveryQueue, LivenessGuard};
    use crate::config::StoreConfig;
    use crate::registry::StoreBuilder;

    fn store() -> StoreRegistry {
        StoreBuilder::new(StoreConfig::new("async"))
            .register(UserMapper)
            .build()
            .unwrap()
    }

    fn wait_for(queue: &DeliveryQueue, deliveries: usize) {
        for _ in 0..500 {
            if queue.len() >= deliveries {
                return;
            }
            std::thread::sleep(Duration::from_millis(2));
        }
        panic!("delivery queue never reached {deliveries} entries");
    }

    #[test]
    fn insert_then_query_in_submission_order() {
        let store = store();
        let (tx, rx) = mpsc::channel();

        let sender = tx.clone();
        store.insert_async(
            user("Ann", 30),
            DeliveryOptions::inline(),
            move |result: StoreResult<i64>| {
                sender.send(result.unwrap().to_string()).unwrap();
            },
        );
        store.query_async::<User, _>(
            Value::Integer(1),
            DeliveryOptions::inline(),
            move |result: StoreResult<Option<User>>| {
                tx.send(result.unwrap().unwrap().name).unwrap();
            },
        );

        // One worker keeps submission order.
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), "1");
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), "Ann");
    }

    #[test]
    fn queued_results_wait_for_the_owner_drain() {
        let store = store();
        let queue = DeliveryQueue::new();
        let delivered = Arc::new(AtomicUsize::new(0));

        let seen = Arc::clone(&delivered);
        store.insert_async(
            user("Ann", 30),
            DeliveryOptions::queued(&queue),
            move |result: StoreResult<i64>| {
                assert_eq!(result.unwrap(), 1);
                seen.fetch_add(1, Ordering::SeqCst);
            },
        );

        wait_for(&queue, 1);
        assert_eq!(delivered.load(Ordering::SeqCst), 0);
        assert_eq!(queue.drain(), 1);
        assert_eq!(delivered.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn guarded_results_stop_with_their_owner() {
        let store = store();
        let queue = DeliveryQueue::new();
        let guard = LivenessGuard::new();
        let delivered = Arc::new(AtomicUsize::new(0));

        let seen = Arc::clone(&delivered);
        store.insert_async(
            user("Ann", 30),
            DeliveryOptions::queued(&queue).guarded(&guard.watch()),
            move |_: StoreResult<i64>| {
                seen.fetch_add(1, Ordering::SeqCst);
            },
        );

        wait_for(&queue, 1);
        drop(guard);
        queue.drain();
        assert_eq!(delivered.load(Ordering::SeqCst), 0);
        // The write itself still happened.
        assert_eq!(store.try_count::<User>(None, &[]).unwrap(), 1);
    }

    #[test]
    fn resolution_failures_are_delivered() {
        let store = store();
        let (tx, rx) = mpsc::channel();

        store.query_async::<String, _>(
            Value::Integer(1),
            DeliveryOptions::inline(),
            move |result: StoreResult<Option<String>>| {
                tx.send(result.unwrap_err().to_string()).unwrap();
            },
        );

        let message = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(message.contains("no controller"));
    }

    #[test]
    fn process_stage_runs_before_delivery() {
        let store = store();
        store
            .try_batch_insert(vec![user("Ann", 30), user("Bea", 31), user("Cara", 20)])
            .unwrap();

        let (tx, rx) = mpsc::channel();
        store.query_where_async_with::<User, _, _, _>(
            "age >= ?",
            vec![Value::Integer(30)],
            |users| {
                let mut names: Vec<String> = users.into_iter().map(|u| u.name).collect();
                names.sort();
                names
            },
            DeliveryOptions::inline(),
            move |result: StoreResult<Vec<String>>| {
                tx.send(result.unwrap()).unwrap();
            },
        );

        let names = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(names, vec!["Ann".to_string(), "Bea".to_string()]);
    }

    #[test]
    fn keyed_writes_and_projections_run_async() {
        let store = store();
        store
            .try_batch_insert(vec![user("Ann", 30), user("Bea", 31), user("Cara", 20)])
            .unwrap();
        let (tx, rx) = mpsc::channel();

        let sender = tx.clone();
        store.update_keys_async::<User, _>(
            vec![Value::Integer(3)],
            ColumnMap::new().with("age", 21),
            DeliveryOptions::inline(),
            move |result: StoreResult<bool>| {
                sender.send(result.unwrap().to_string()).unwrap();
            },
        );
        let sender = tx.clone();
        store.column_strings_async::<User, _>(
            "name",
            Some("age >= ? ORDER BY age"),
            vec![Value::Integer(30)],
            DeliveryOptions::inline(),
            move |result: StoreResult<Vec<String>>| {
                sender.send(result.unwrap().join(",")).unwrap();
            },
        );
        let sender = tx.clone();
        store.delete_keys_async::<User, _>(
            vec![Value::Integer(1), Value::Integer(2)],
            DeliveryOptions::inline(),
            move |result: StoreResult<bool>| {
                sender.send(result.unwrap().to_string()).unwrap();
            },
        );
        store.has_where_async::<User, _>(
            "age >= ?",
            vec![Value::Integer(30)],
            DeliveryOptions::inline(),
            move |result: StoreResult<bool>| {
                tx.send(result.unwrap().to_string()).unwrap();
            },
        );

        // Single worker, submission order: bump Cara to 21, list the
        // thirty-somethings, delete them, then nobody is left over 30.
        for expected in ["true", "Ann,Bea", "true", "false"] {
            assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), expected);
        }
    }

    #[test]
    fn transactions_and_aggregates_run_async() {
        let store = store();
        let (tx, rx) = mpsc::channel();

        let sender = tx.clone();
        store.execute_transaction_async(
            |engine: &Engine| {
                for age in [21, 22, 23] {
                    let row = ColumnMap::new()
                        .with("name", format!("user{age}"))
                        .with("age", age);
                    engine.insert("users", &row)?;
                }
                Ok(())
            },
            DeliveryOptions::inline(),
            move |result: StoreResult<()>| {
                sender.send(result.is_ok() as i64).unwrap();
            },
        );
        store.scalar_i64_async::<User, _>(
            "COUNT(1)",
            None,
            Vec::new(),
            DeliveryOptions::inline(),
            move |result: StoreResult<Option<i64>>| {
                tx.send(result.unwrap().unwrap_or(0)).unwrap();
            },
        );

        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), 1);
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), 3);
    }

    #[test]
    fn teardown_finishes_queued_writes() {
        let engine = Engine::in_memory();
        let store = StoreBuilder::new(StoreConfig::new("teardown"))
            .engine(engine.clone())
            .register(UserMapper)
            .build()
            .unwrap();

        for i in 0..20 {
            store.insert_async(
                user(&format!("user{i}"), i),
                DeliveryOptions::inline(),
                |_: StoreResult<i64>| {},
            );
        }
        // Dropping the last handle joins the pool after the queue drains.
        drop(store);

        let rows = engine
            .select("users", &["COUNT(1)"], None, &[])
            .unwrap();
        assert_eq!(rows.scalar_i64("COUNT(1)"), Some(20));
    }
}
