// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Multicast group, membership and queue operations.

use async_bb8_diesel::AsyncRunQueryDsl;
use chrono::{Duration, Utc};
use diesel::prelude::*;
use diesel::result::DatabaseErrorKind;
use diesel::result::Error as DieselError;
use slog::info;
use uuid::Uuid;

use lorikeet_common::{
    CreateResult, DeleteResult, Error, ListResultVec, LookupResult,
    LookupType, ResourceType, UpdateResult,
};
use lorikeet_db_model::{
    DeviceMulticastGroup, Eui64, MulticastGroup, MulticastGroupUpdate,
    MulticastQueueItem, MulticastQueueItemValues,
};

use crate::db::error::{map_diesel_error, ErrorHandler};
use crate::db::datastore::DataStore;
use crate::db::Conn;

impl DataStore {
    /// Create a multicast group.
    pub async fn multicast_group_create(
        &self,
        group: MulticastGroup,
    ) -> CreateResult<MulticastGroup> {
        use lorikeet_db_model::schema::multicast_group::dsl;

        let conn = self.pool_connection().await?;
        let group = diesel::insert_into(dsl::multicast_group)
            .values(group)
            .returning(MulticastGroup::as_returning())
            .get_result_async(&*conn)
            .await
            .map_err(|e| {
                map_diesel_error(
                    e,
                    ErrorHandler::Insert(
                        ResourceType::MulticastGroup,
                        "multicast group",
                    ),
                )
            })?;

        info!(self.log, "multicast-group created"; "id" => %group.id);
        Ok(group)
    }

    /// Look up a multicast group by id.
    pub async fn multicast_group_get(
        &self,
        id: Uuid,
    ) -> LookupResult<MulticastGroup> {
        let conn = self.pool_connection().await?;
        self.multicast_group_get_on_conn(&conn, id).await
    }

    pub async fn multicast_group_get_on_conn(
        &self,
        conn: &Conn,
        id: Uuid,
    ) -> LookupResult<MulticastGroup> {
        use lorikeet_db_model::schema::multicast_group::dsl;

        dsl::multicast_group
            .filter(dsl::id.eq(id))
            .select(MulticastGroup::as_select())
            .first_async(conn)
            .await
            .map_err(|e| {
                map_diesel_error(
                    e,
                    ErrorHandler::Lookup(
                        ResourceType::MulticastGroup,
                        LookupType::ById(id),
                    ),
                )
            })
    }

    /// Look up a multicast group by id, taking a row-level exclusive lock
    /// held until the surrounding transaction commits.
    ///
    /// This is the serialisation point between concurrent enqueues and the
    /// dispatcher: whoever holds the group row owns its queue.
    pub async fn multicast_group_get_for_update_on_conn(
        &self,
        conn: &Conn,
        id: Uuid,
    ) -> LookupResult<MulticastGroup> {
        use lorikeet_db_model::schema::multicast_group::dsl;

        dsl::multicast_group
            .filter(dsl::id.eq(id))
            .select(MulticastGroup::as_select())
            .for_update()
            .first_async(conn)
            .await
            .map_err(|e| {
                map_diesel_error(
                    e,
                    ErrorHandler::Lookup(
                        ResourceType::MulticastGroup,
                        LookupType::ById(id),
                    ),
                )
            })
    }

    /// Update a multicast group.
    pub async fn multicast_group_update(
        &self,
        id: Uuid,
        update: MulticastGroupUpdate,
    ) -> UpdateResult<()> {
        use lorikeet_db_model::schema::multicast_group::dsl;

        let conn = self.pool_connection().await?;
        let rows = diesel::update(dsl::multicast_group.filter(dsl::id.eq(id)))
            .set(update)
            .execute_async(&*conn)
            .await
            .map_err(|e| map_diesel_error(e, ErrorHandler::Operational))?;
        if rows == 0 {
            return Err(Error::not_found_by_id(
                ResourceType::MulticastGroup,
                &id,
            ));
        }

        info!(self.log, "multicast-group updated"; "id" => %id);
        Ok(())
    }

    /// Bump the group frame counter.  Callers must hold the group lock.
    pub async fn multicast_group_set_f_cnt_on_conn(
        &self,
        conn: &Conn,
        id: Uuid,
        f_cnt: u32,
    ) -> UpdateResult<()> {
        use lorikeet_db_model::schema::multicast_group::dsl;

        let rows = diesel::update(dsl::multicast_group.filter(dsl::id.eq(id)))
            .set((
                dsl::f_cnt.eq(f_cnt as i32),
                dsl::updated_at.eq(Utc::now()),
            ))
            .execute_async(conn)
            .await
            .map_err(|e| map_diesel_error(e, ErrorHandler::Operational))?;
        if rows == 0 {
            return Err(Error::not_found_by_id(
                ResourceType::MulticastGroup,
                &id,
            ));
        }
        Ok(())
    }

    /// Delete a multicast group; queue items and memberships cascade away
    /// with it.
    pub async fn multicast_group_delete(&self, id: Uuid) -> DeleteResult {
        use lorikeet_db_model::schema::multicast_group::dsl;

        let conn = self.pool_connection().await?;
        let rows = diesel::delete(dsl::multicast_group.filter(dsl::id.eq(id)))
            .execute_async(&*conn)
            .await
            .map_err(|e| map_diesel_error(e, ErrorHandler::Operational))?;
        if rows == 0 {
            return Err(Error::not_found_by_id(
                ResourceType::MulticastGroup,
                &id,
            ));
        }

        info!(self.log, "multicast-group deleted"; "id" => %id);
        Ok(())
    }

    /// Add a device to a multicast group.
    pub async fn device_multicast_group_add(
        &self,
        multicast_group_id: Uuid,
        dev_eui: lorikeet_lorawan::Eui64,
    ) -> CreateResult<DeviceMulticastGroup> {
        use lorikeet_db_model::schema::device_multicast_group::dsl;

        let conn = self.pool_connection().await?;
        let membership = diesel::insert_into(dsl::device_multicast_group)
            .values(DeviceMulticastGroup::new(multicast_group_id, dev_eui))
            .returning(DeviceMulticastGroup::as_returning())
            .get_result_async(&*conn)
            .await
            .map_err(|e| match e {
                DieselError::DatabaseError(
                    DatabaseErrorKind::ForeignKeyViolation,
                    _,
                ) => Error::invalid_request(
                    "device or multicast group does not exist",
                ),
                other => map_diesel_error(
                    other,
                    ErrorHandler::Insert(
                        ResourceType::MulticastGroupMembership,
                        "membership",
                    ),
                ),
            })?;

        info!(
            self.log, "device added to multicast-group";
            "multicast_group_id" => %multicast_group_id,
            "dev_eui" => %dev_eui,
        );
        Ok(membership)
    }

    /// Remove a device from a multicast group.
    pub async fn device_multicast_group_remove(
        &self,
        multicast_group_id: Uuid,
        dev_eui: lorikeet_lorawan::Eui64,
    ) -> DeleteResult {
        use lorikeet_db_model::schema::device_multicast_group::dsl;

        let conn = self.pool_connection().await?;
        let rows = diesel::delete(
            dsl::device_multicast_group
                .filter(dsl::multicast_group_id.eq(multicast_group_id))
                .filter(dsl::dev_eui.eq(Eui64::from(dev_eui))),
        )
        .execute_async(&*conn)
        .await
        .map_err(|e| map_diesel_error(e, ErrorHandler::Operational))?;
        if rows == 0 {
            return Err(Error::ObjectNotFound {
                type_name: ResourceType::MulticastGroupMembership,
                lookup_type: LookupType::ByName(format!(
                    "{}/{}",
                    multicast_group_id, dev_eui
                )),
            });
        }

        info!(
            self.log, "device removed from multicast-group";
            "multicast_group_id" => %multicast_group_id,
            "dev_eui" => %dev_eui,
        );
        Ok(())
    }

    /// List the multicast groups a device belongs to.
    pub async fn multicast_groups_for_dev_eui(
        &self,
        dev_eui: lorikeet_lorawan::Eui64,
    ) -> ListResultVec<Uuid> {
        use lorikeet_db_model::schema::device_multicast_group::dsl;

        let conn = self.pool_connection().await?;
        dsl::device_multicast_group
            .filter(dsl::dev_eui.eq(Eui64::from(dev_eui)))
            .order(dsl::multicast_group_id.asc())
            .select(dsl::multicast_group_id)
            .get_results_async(&*conn)
            .await
            .map_err(|e| map_diesel_error(e, ErrorHandler::Operational))
    }

    /// List the DevEUIs subscribed to a multicast group.
    pub async fn dev_euis_for_multicast_group(
        &self,
        multicast_group_id: Uuid,
    ) -> ListResultVec<lorikeet_lorawan::Eui64> {
        let conn = self.pool_connection().await?;
        self.dev_euis_for_multicast_group_on_conn(&conn, multicast_group_id)
            .await
    }

    pub async fn dev_euis_for_multicast_group_on_conn(
        &self,
        conn: &Conn,
        multicast_group_id: Uuid,
    ) -> ListResultVec<lorikeet_lorawan::Eui64> {
        use lorikeet_db_model::schema::device_multicast_group::dsl;

        let dev_euis: Vec<Eui64> = dsl::device_multicast_group
            .filter(dsl::multicast_group_id.eq(multicast_group_id))
            .order(dsl::dev_eui.asc())
            .select(dsl::dev_eui)
            .get_results_async(conn)
            .await
            .map_err(|e| map_diesel_error(e, ErrorHandler::Operational))?;
        Ok(dev_euis.into_iter().map(Into::into).collect())
    }

    /// Append an item to a group queue.
    ///
    /// The caller supplies the frame counter; uniqueness of
    /// `(group, f_cnt, gateway)` is enforced by the database, so a
    /// concurrent duplicate surfaces as `ObjectAlreadyExists`.
    pub async fn multicast_queue_item_enqueue_on_conn(
        &self,
        conn: &Conn,
        values: MulticastQueueItemValues,
    ) -> CreateResult<MulticastQueueItem> {
        use lorikeet_db_model::schema::multicast_queue::dsl;

        if values.f_port == 0 {
            return Err(Error::invalid_value("f_port", "must be > 0"));
        }

        let item = diesel::insert_into(dsl::multicast_queue)
            .values(values)
            .returning(MulticastQueueItem::as_returning())
            .get_result_async(conn)
            .await
            .map_err(|e| {
                map_diesel_error(
                    e,
                    ErrorHandler::Insert(
                        ResourceType::MulticastQueueItem,
                        "queue item",
                    ),
                )
            })?;

        info!(
            self.log, "multicast queue-item created";
            "multicast_group_id" => %item.multicast_group_id,
            "f_cnt" => item.f_cnt,
            "gateway_id" => %item.gateway_id.0,
        );
        Ok(item)
    }

    /// Delete the queue rows carrying the given frame counter (all
    /// gateway fan-out rows).  Admin-surface operation.
    pub async fn multicast_queue_item_delete(
        &self,
        multicast_group_id: Uuid,
        f_cnt: u32,
    ) -> DeleteResult {
        use lorikeet_db_model::schema::multicast_queue::dsl;

        let conn = self.pool_connection().await?;
        let rows = diesel::delete(
            dsl::multicast_queue
                .filter(dsl::multicast_group_id.eq(multicast_group_id))
                .filter(dsl::f_cnt.eq(f_cnt as i32)),
        )
        .execute_async(&*conn)
        .await
        .map_err(|e| map_diesel_error(e, ErrorHandler::Operational))?;
        if rows == 0 {
            return Err(Error::ObjectNotFound {
                type_name: ResourceType::MulticastQueueItem,
                lookup_type: LookupType::ByName(format!(
                    "{}/{}",
                    multicast_group_id, f_cnt
                )),
            });
        }

        info!(
            self.log, "multicast queue-items deleted";
            "multicast_group_id" => %multicast_group_id,
            "f_cnt" => f_cnt,
        );
        Ok(())
    }

    /// Delete one emitted queue row.  Dispatcher-side operation; runs in
    /// the transaction that claimed the group.
    pub async fn multicast_queue_item_delete_by_id_on_conn(
        &self,
        conn: &Conn,
        id: i64,
    ) -> DeleteResult {
        use lorikeet_db_model::schema::multicast_queue::dsl;

        let rows = diesel::delete(dsl::multicast_queue.filter(dsl::id.eq(id)))
            .execute_async(conn)
            .await
            .map_err(|e| map_diesel_error(e, ErrorHandler::Operational))?;
        if rows == 0 {
            return Err(Error::internal_error(&format!(
                "multicast queue row {} vanished while its group was locked",
                id
            )));
        }
        Ok(())
    }

    /// Drop every queued item for a group.
    pub async fn multicast_queue_flush(
        &self,
        multicast_group_id: Uuid,
    ) -> DeleteResult {
        use lorikeet_db_model::schema::multicast_queue::dsl;

        let conn = self.pool_connection().await?;
        let rows = diesel::delete(
            dsl::multicast_queue
                .filter(dsl::multicast_group_id.eq(multicast_group_id)),
        )
        .execute_async(&*conn)
        .await
        .map_err(|e| map_diesel_error(e, ErrorHandler::Operational))?;

        info!(
            self.log, "multicast-group queue flushed";
            "multicast_group_id" => %multicast_group_id,
            "count" => rows,
        );
        Ok(())
    }

    /// List a group queue in ascending frame-counter order.
    pub async fn multicast_queue_items_list(
        &self,
        multicast_group_id: Uuid,
    ) -> ListResultVec<MulticastQueueItem> {
        let conn = self.pool_connection().await?;
        self.multicast_queue_items_list_on_conn(&conn, multicast_group_id)
            .await
    }

    pub async fn multicast_queue_items_list_on_conn(
        &self,
        conn: &Conn,
        multicast_group_id: Uuid,
    ) -> ListResultVec<MulticastQueueItem> {
        use lorikeet_db_model::schema::multicast_queue::dsl;

        dsl::multicast_queue
            .filter(dsl::multicast_group_id.eq(multicast_group_id))
            .order((dsl::f_cnt.asc(), dsl::id.asc()))
            .select(MulticastQueueItem::as_select())
            .get_results_async(conn)
            .await
            .map_err(|e| map_diesel_error(e, ErrorHandler::Operational))
    }

    /// The head of a group queue: the row with the smallest frame counter
    /// (ties broken by insertion order), or `None` when the queue is
    /// empty.
    pub async fn multicast_queue_next_item_on_conn(
        &self,
        conn: &Conn,
        multicast_group_id: Uuid,
    ) -> LookupResult<Option<MulticastQueueItem>> {
        use lorikeet_db_model::schema::multicast_queue::dsl;

        dsl::multicast_queue
            .filter(dsl::multicast_group_id.eq(multicast_group_id))
            .order((dsl::f_cnt.asc(), dsl::id.asc()))
            .select(MulticastQueueItem::as_select())
            .first_async(conn)
            .await
            .optional()
            .map_err(|e| map_diesel_error(e, ErrorHandler::Operational))
    }

    /// Largest stamped emission time in a group queue; zero when the
    /// queue is empty.  Anchors Class-B ping-slot chaining.
    pub async fn multicast_queue_max_emit_at_on_conn(
        &self,
        conn: &Conn,
        multicast_group_id: Uuid,
    ) -> LookupResult<Duration> {
        use lorikeet_db_model::schema::multicast_queue::dsl;

        let max: Option<i64> = dsl::multicast_queue
            .filter(dsl::multicast_group_id.eq(multicast_group_id))
            .select(diesel::dsl::max(dsl::emit_at_time_since_gps_epoch))
            .get_result_async(conn)
            .await
            .map_err(|e| map_diesel_error(e, ErrorHandler::Operational))?;
        Ok(Duration::nanoseconds(max.unwrap_or(0)))
    }

    /// Select up to `limit` groups with dispatchable queue items, locking
    /// the group rows and skipping rows locked by concurrent
    /// transactions.
    ///
    /// A group is dispatchable when it has at least one queue row and
    /// either is Class-C or has a row whose emission time falls before
    /// `emit_before`.  The `SKIP LOCKED` clause is what lets multiple
    /// scheduler instances share one queue without coordination, so this
    /// query is hand-written SQL.
    pub async fn multicast_groups_with_dispatchable_items_on_conn(
        &self,
        conn: &Conn,
        limit: i64,
        emit_before: Duration,
    ) -> ListResultVec<MulticastGroup> {
        let emit_before = emit_before.num_nanoseconds().ok_or_else(|| {
            Error::internal_error("emission horizon overflows nanoseconds")
        })?;

        diesel::sql_query(
            r#"
            SELECT mg.*
              FROM multicast_group mg
             WHERE EXISTS (
                    SELECT 1
                      FROM multicast_queue mq
                     WHERE mq.multicast_group_id = mg.id
                       AND (
                            mg.group_type = 'C'
                         OR (
                                mg.group_type = 'B'
                            AND mq.emit_at_time_since_gps_epoch <= $1
                            )
                           )
                   )
             LIMIT $2
               FOR UPDATE OF mg SKIP LOCKED
            "#,
        )
        .bind::<diesel::sql_types::Int8, _>(emit_before)
        .bind::<diesel::sql_types::Int8, _>(limit)
        .get_results_async(conn)
        .await
        .map_err(|e| map_diesel_error(e, ErrorHandler::Operational))
    }
}
