diesel::table! {
    env_objects (id) {
        id -> Uuid,
        repo_id -> Uuid,
        branch -> Text,
        path -> Text,
        nonce -> Text,
        ciphertext -> Bytea,
        aad -> Text,
        ciphertext_hash -> Text,
        version -> Int4,
        created_at -> Timestamp,
        client_created_at -> Nullable<Text>,
        schema_version -> Int4,
    }
}

diesel::table! {
    job_registry (job_name) {
        job_name -> Text,
        last_run_timestamp -> Timestamp,
    }
}

diesel::table! {
    login_attempts (attempt_key) {
        attempt_key -> Text,
        count -> Int4,
        window_start -> Timestamp,
    }
}

diesel::table! {
    repo_access (repo_id, user_id) {
        repo_id -> Uuid,
        user_id -> Uuid,
        role -> Text,
        created_at -> Timestamp,
        updated_at -> Timestamp,
    }
}

diesel::table! {
    repo_invites (id) {
        id -> Uuid,
        repo_id -> Uuid,
        email -> Text,
        invited_by_user_id -> Uuid,
        role -> Text,
        status -> Text,
        created_at -> Timestamp,
        updated_at -> Timestamp,
    }
}

diesel::table! {
    repo_key_events (id) {
        id -> Uuid,
        repo_id -> Uuid,
        requester_user_id -> Uuid,
        requester_email -> Text,
        target_user_id -> Uuid,
        target_email -> Text,
        action -> Text,
        created_at -> Timestamp,
    }
}

diesel::table! {
    repo_keys (repo_id, user_id) {
        repo_id -> Uuid,
        user_id -> Uuid,
        wrapped_key -> Text,
        algorithm -> Text,
        created_at -> Timestamp,
        updated_at -> Timestamp,
    }
}

diesel::table! {
    repo_links (user_id, repo_id) {
        user_id -> Uuid,
        repo_id -> Uuid,
        last_seen -> Timestamp,
    }
}

diesel::table! {
    repos (id) {
        id -> Uuid,
        owner_user_id -> Uuid,
        name -> Text,
        manifest_json -> Text,
        created_at -> Timestamp,
    }
}

diesel::table! {
    sessions (token_digest) {
        token_digest -> Bytea,
        token_suffix -> Text,
        user_id -> Uuid,
        host -> Text,
        created_at -> Timestamp,
        expires_at -> Timestamp,
    }
}

diesel::table! {
    umk_blobs (user_id) {
        user_id -> Uuid,
        encrypted_umk -> Text,
        kdf_params -> Text,
        version -> Int4,
        updated_at -> Timestamp,
    }
}

diesel::table! {
    user_keys (user_id) {
        user_id -> Uuid,
        public_key -> Text,
        algorithm -> Text,
        created_at -> Timestamp,
        updated_at -> Timestamp,
    }
}

diesel::table! {
    users (id) {
        id -> Uuid,
        email -> Text,
        password_hash -> Bytea,
        password_salt -> Bytea,
        password_iters -> Int4,
        created_at -> Timestamp,
    }
}

diesel::joinable!(env_objects -> repos (repo_id));
diesel::joinable!(repo_access -> repos (repo_id));
diesel::joinable!(repo_access -> users (user_id));
diesel::joinable!(repo_invites -> repos (repo_id));
diesel::joinable!(repo_invites -> users (invited_by_user_id));
diesel::joinable!(repo_key_events -> repos (repo_id));
diesel::joinable!(repo_keys -> repos (repo_id));
diesel::joinable!(repo_links -> repos (repo_id));
diesel::joinable!(repo_links -> users (user_id));
diesel::joinable!(repos -> users (owner_user_id));
diesel::joinable!(sessions -> users (user_id));
diesel::joinable!(umk_blobs -> users (user_id));
diesel::joinable!(user_keys -> users (user_id));

diesel::allow_tables_to_appear_in_same_query!(
    env_objects,
    job_registry,
    login_attempts,
    repo_access,
    repo_invites,
    repo_key_events,
    repo_keys,
    repo_links,
    repos,
    sessions,
    umk_blobs,
    user_keys,
    users,
);
