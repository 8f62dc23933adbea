// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Diesel table definitions.  The authoritative DDL lives in
//! `schema/dbinit.sql`; the two must be kept in sync by hand.

diesel::table! {
    multicast_group (id) {
        id -> Uuid,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
        mc_addr -> Bytea,
        mc_net_s_key -> Bytea,
        f_cnt -> Int4,
        group_type -> Text,
        dr -> Int4,
        frequency -> Int8,
        ping_slot_period -> Int4,
    }
}

diesel::table! {
    device_multicast_group (multicast_group_id, dev_eui) {
        multicast_group_id -> Uuid,
        dev_eui -> Bytea,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    multicast_queue (id) {
        id -> Int8,
        created_at -> Timestamptz,
        schedule_at -> Timestamptz,
        emit_at_time_since_gps_epoch -> Nullable<Int8>,
        multicast_group_id -> Uuid,
        gateway_id -> Bytea,
        f_cnt -> Int4,
        f_port -> Int4,
        frm_payload -> Bytea,
    }
}

diesel::joinable!(device_multicast_group -> multicast_group (multicast_group_id));
diesel::joinable!(multicast_queue -> multicast_group (multicast_group_id));

diesel::allow_tables_to_appear_in_same_query!(
    multicast_group,
    device_multicast_group,
    multicast_queue,
);
