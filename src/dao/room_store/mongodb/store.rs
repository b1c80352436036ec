use std::{sync::Arc, time::SystemTime};

use futures::{TryStreamExt, future::BoxFuture};
use mongodb::{
    Client, Collection, Database, IndexModel,
    bson::{Bson, DateTime, doc, serialize_to_bson},
    options::IndexOptions,
};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{
    config::MongoConfig,
    connection::establish_connection,
    error::{MongoDaoError, MongoResult},
    models::{
        MongoEventDocument, MongoHistoryDocument, MongoMissionDocument,
        MongoPendingChoiceDocument, MongoPlayerMissionDocument, MongoRoomDocument,
        MongoRoomEventDocument,
    },
};
use crate::dao::{
    models::{
        EventEntity, GameHistoryEntity, MissionEntity, MissionKind, PendingChoiceEntity,
        PlayerMissionEntity, RoomEntity, RoomEventEntity, TeamSide,
    },
    room_store::RoomStore,
    storage::StorageResult,
};

const ROOM_COLLECTION: &str = "rooms";
const MISSION_COLLECTION: &str = "missions";
const EVENT_COLLECTION: &str = "events";
const PLAYER_MISSION_COLLECTION: &str = "player_missions";
const PENDING_CHOICE_COLLECTION: &str = "pending_choices";
const ROOM_EVENT_COLLECTION: &str = "room_events";
const HISTORY_COLLECTION: &str = "histories";

const ASSIGNMENT_CONSTRAINT: &str = "player_missions(player_id, kind)";
const CHOICE_CONSTRAINT: &str = "pending_choices(player_id, kind)";
const ROOM_EVENT_CONSTRAINT: &str = "room_events(room_code, ordinal)";

/// MongoDB-backed [`RoomStore`].
#[derive(Clone)]
pub struct MongoRoomStore {
    inner: Arc<MongoInner>,
}

struct MongoInner {
    state: RwLock<MongoState>,
    config: MongoConfig,
}

struct MongoState {
    client: Client,
    database: Database,
}

impl MongoInner {
    async fn ping(&self) -> MongoResult<()> {
        let database = {
            let guard = self.state.read().await;
            guard.database.clone()
        };

        database
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|source| MongoDaoError::HealthPing { source })?;
        Ok(())
    }

    async fn reconnect(&self) -> MongoResult<()> {
        let (client, database) =
            establish_connection(&self.config.options, &self.config.database_name).await?;
        let mut guard = self.state.write().await;
        guard.client = client;
        guard.database = database;
        Ok(())
    }
}

impl MongoRoomStore {
    /// Establish a connection to MongoDB and ensure indexes are present.
    pub async fn connect(config: MongoConfig) -> MongoResult<Self> {
        let (client, database) =
            establish_connection(&config.options, &config.database_name).await?;

        let inner = Arc::new(MongoInner {
            state: RwLock::new(MongoState { client, database }),
            config,
        });

        let store = Self { inner };
        store.ensure_indexes().await?;
        Ok(store)
    }

    /// Create the unique indexes the coordinators use as their
    /// mutual-exclusion primitives.
    async fn ensure_indexes(&self) -> MongoResult<()> {
        let database = self.database().await;

        let unique = |keys, name: &str| {
            IndexModel::builder()
                .keys(keys)
                .options(
                    IndexOptions::builder()
                        .name(Some(name.to_owned()))
                        .unique(Some(true))
                        .build(),
                )
                .build()
        };

        database
            .collection::<MongoPlayerMissionDocument>(PLAYER_MISSION_COLLECTION)
            .create_index(unique(
                doc! {"player_id": 1, "kind": 1},
                "player_mission_unique_idx",
            ))
            .await
            .map_err(|source| MongoDaoError::EnsureIndex {
                collection: PLAYER_MISSION_COLLECTION,
                index: "player_id,kind",
                source,
            })?;

        database
            .collection::<MongoPendingChoiceDocument>(PENDING_CHOICE_COLLECTION)
            .create_index(unique(
                doc! {"player_id": 1, "kind": 1},
                "pending_choice_unique_idx",
            ))
            .await
            .map_err(|source| MongoDaoError::EnsureIndex {
                collection: PENDING_CHOICE_COLLECTION,
                index: "player_id,kind",
                source,
            })?;

        database
            .collection::<MongoRoomEventDocument>(ROOM_EVENT_COLLECTION)
            .create_index(unique(
                doc! {"room_code": 1, "ordinal": 1},
                "room_event_unique_idx",
            ))
            .await
            .map_err(|source| MongoDaoError::EnsureIndex {
                collection: ROOM_EVENT_COLLECTION,
                index: "room_code,ordinal",
                source,
            })?;

        database
            .collection::<MongoMissionDocument>(MISSION_COLLECTION)
            .create_index(
                IndexModel::builder()
                    .keys(doc! {"kind": 1})
                    .options(
                        IndexOptions::builder()
                            .name(Some("mission_kind_idx".to_owned()))
                            .build(),
                    )
                    .build(),
            )
            .await
            .map_err(|source| MongoDaoError::EnsureIndex {
                collection: MISSION_COLLECTION,
                index: "kind",
                source,
            })?;

        Ok(())
    }

    async fn database(&self) -> Database {
        let guard = self.inner.state.read().await;
        guard.database.clone()
    }

    async fn rooms(&self) -> Collection<MongoRoomDocument> {
        self.database().await.collection(ROOM_COLLECTION)
    }

    async fn missions(&self) -> Collection<MongoMissionDocument> {
        self.database().await.collection(MISSION_COLLECTION)
    }

    async fn events(&self) -> Collection<MongoEventDocument> {
        self.database().await.collection(EVENT_COLLECTION)
    }

    async fn player_missions(&self) -> Collection<MongoPlayerMissionDocument> {
        self.database().await.collection(PLAYER_MISSION_COLLECTION)
    }

    async fn pending_choices(&self) -> Collection<MongoPendingChoiceDocument> {
        self.database().await.collection(PENDING_CHOICE_COLLECTION)
    }

    async fn room_events(&self) -> Collection<MongoRoomEventDocument> {
        self.database().await.collection(ROOM_EVENT_COLLECTION)
    }

    async fn histories(&self) -> Collection<MongoHistoryDocument> {
        self.database().await.collection(HISTORY_COLLECTION)
    }

    async fn find_room(&self, code: String) -> MongoResult<Option<RoomEntity>> {
        let document = self
            .rooms()
            .await
            .find_one(doc! {"_id": &code})
            .await
            .map_err(|source| MongoDaoError::LoadRoom {
                code: code.clone(),
                source,
            })?;

        document.map(RoomEntity::try_from).transpose()
    }

    async fn missions_by_kind(&self, kind: MissionKind) -> MongoResult<Vec<MissionEntity>> {
        let kind = serialize_to_bson(&kind).unwrap_or(Bson::Null);
        let documents: Vec<MongoMissionDocument> = self
            .missions()
            .await
            .find(doc! {"kind": kind})
            .await
            .map_err(|source| MongoDaoError::ListCatalog {
                catalog: "mission",
                source,
            })?
            .try_collect()
            .await
            .map_err(|source| MongoDaoError::ListCatalog {
                catalog: "mission",
                source,
            })?;

        documents.into_iter().map(TryInto::try_into).collect()
    }

    async fn event_catalog(&self) -> MongoResult<Vec<EventEntity>> {
        let documents: Vec<MongoEventDocument> = self
            .events()
            .await
            .find(doc! {})
            .await
            .map_err(|source| MongoDaoError::ListCatalog {
                catalog: "event",
                source,
            })?
            .try_collect()
            .await
            .map_err(|source| MongoDaoError::ListCatalog {
                catalog: "event",
                source,
            })?;

        documents.into_iter().map(TryInto::try_into).collect()
    }

    async fn load_player_missions(&self, code: String) -> MongoResult<Vec<PlayerMissionEntity>> {
        let documents: Vec<MongoPlayerMissionDocument> = self
            .player_missions()
            .await
            .find(doc! {"room_code": &code})
            .await
            .map_err(|source| MongoDaoError::LoadAssignments {
                code: code.clone(),
                source,
            })?
            .try_collect()
            .await
            .map_err(|source| MongoDaoError::LoadAssignments {
                code: code.clone(),
                source,
            })?;

        documents.into_iter().map(TryInto::try_into).collect()
    }

    async fn load_pending_choices(&self, code: String) -> MongoResult<Vec<PendingChoiceEntity>> {
        let documents: Vec<MongoPendingChoiceDocument> = self
            .pending_choices()
            .await
            .find(doc! {"room_code": &code})
            .await
            .map_err(|source| MongoDaoError::LoadAssignments {
                code: code.clone(),
                source,
            })?
            .try_collect()
            .await
            .map_err(|source| MongoDaoError::LoadAssignments {
                code: code.clone(),
                source,
            })?;

        documents.into_iter().map(TryInto::try_into).collect()
    }

    async fn insert_player_missions(&self, missions: Vec<PlayerMissionEntity>) -> MongoResult<()> {
        let documents: Vec<MongoPlayerMissionDocument> =
            missions.into_iter().map(Into::into).collect();
        self.player_missions()
            .await
            .insert_many(documents)
            .await
            .map_err(|source| MongoDaoError::InsertBatch {
                collection: PLAYER_MISSION_COLLECTION,
                constraint: ASSIGNMENT_CONSTRAINT,
                source,
            })?;
        Ok(())
    }

    async fn insert_pending_choices(&self, choices: Vec<PendingChoiceEntity>) -> MongoResult<()> {
        let documents: Vec<MongoPendingChoiceDocument> =
            choices.into_iter().map(Into::into).collect();
        self.pending_choices()
            .await
            .insert_many(documents)
            .await
            .map_err(|source| MongoDaoError::InsertBatch {
                collection: PENDING_CHOICE_COLLECTION,
                constraint: CHOICE_CONSTRAINT,
                source,
            })?;
        Ok(())
    }

    async fn record_mission_decision(
        &self,
        code: String,
        player_id: Uuid,
        kind: MissionKind,
        validated: bool,
        points_earned: i32,
    ) -> MongoResult<bool> {
        let kind = serialize_to_bson(&kind).unwrap_or(Bson::Null);
        let result = self
            .player_missions()
            .await
            .update_one(
                doc! {"room_code": &code, "player_id": player_id.to_string(), "kind": kind},
                doc! {"$set": {"decided": true, "validated": validated, "points_earned": points_earned}},
            )
            .await
            .map_err(|source| MongoDaoError::UpdateAssignment { player_id, source })?;
        Ok(result.matched_count > 0)
    }

    async fn load_room_events(&self, code: String) -> MongoResult<Vec<RoomEventEntity>> {
        let documents: Vec<MongoRoomEventDocument> = self
            .room_events()
            .await
            .find(doc! {"room_code": &code})
            .sort(doc! {"ordinal": 1})
            .await
            .map_err(|source| MongoDaoError::LoadAssignments {
                code: code.clone(),
                source,
            })?
            .try_collect()
            .await
            .map_err(|source| MongoDaoError::LoadAssignments {
                code: code.clone(),
                source,
            })?;

        documents.into_iter().map(TryInto::try_into).collect()
    }

    async fn insert_room_events(&self, events: Vec<RoomEventEntity>) -> MongoResult<()> {
        let documents: Vec<MongoRoomEventDocument> = events.into_iter().map(Into::into).collect();
        self.room_events()
            .await
            .insert_many(documents)
            .await
            .map_err(|source| MongoDaoError::InsertBatch {
                collection: ROOM_EVENT_COLLECTION,
                constraint: ROOM_EVENT_CONSTRAINT,
                source,
            })?;
        Ok(())
    }

    async fn mark_event_appeared(
        &self,
        code: String,
        event_id: Uuid,
        at: SystemTime,
    ) -> MongoResult<bool> {
        let result = self
            .room_events()
            .await
            .update_one(
                doc! {"_id": event_id.to_string(), "room_code": &code, "appeared_at": Bson::Null},
                doc! {"$set": {"appeared_at": DateTime::from(at)}},
            )
            .await
            .map_err(|source| MongoDaoError::UpdateEvent { event_id, source })?;
        Ok(result.matched_count > 0)
    }

    async fn decide_event(
        &self,
        code: String,
        event_id: Uuid,
        winner: Option<TeamSide>,
    ) -> MongoResult<bool> {
        let winner = serialize_to_bson(&winner).unwrap_or(Bson::Null);
        let result = self
            .room_events()
            .await
            .update_one(
                doc! {
                    "_id": event_id.to_string(),
                    "room_code": &code,
                    "decided": false,
                    "appeared_at": {"$ne": Bson::Null},
                },
                doc! {"$set": {"decided": true, "winner": winner}},
            )
            .await
            .map_err(|source| MongoDaoError::UpdateEvent { event_id, source })?;
        Ok(result.matched_count > 0)
    }

    async fn pause_for_event(&self, code: String, at: SystemTime) -> MongoResult<bool> {
        let result = self
            .rooms()
            .await
            .update_one(
                doc! {"_id": &code, "event_paused_at": Bson::Null},
                doc! {"$set": {"event_paused_at": DateTime::from(at)}},
            )
            .await
            .map_err(|source| MongoDaoError::UpdateRoom {
                code: code.clone(),
                source,
            })?;
        Ok(result.matched_count > 0)
    }

    async fn resume_from_event(&self, code: String, at: SystemTime) -> MongoResult<bool> {
        // Read-compute-CAS: the filter re-checks the hold we read so a
        // concurrent resume cannot double-count the interval.
        let Some(room) = self.find_room(code.clone()).await? else {
            return Ok(false);
        };
        let Some(paused_at) = room.event_paused_at else {
            return Ok(false);
        };

        let held = at.duration_since(paused_at).unwrap_or_default();
        let total_ms = (room.total_paused + held).as_millis() as i64;

        let result = self
            .rooms()
            .await
            .update_one(
                doc! {"_id": &code, "event_paused_at": DateTime::from(paused_at)},
                doc! {"$set": {"event_paused_at": Bson::Null, "total_paused_ms": total_ms}},
            )
            .await
            .map_err(|source| MongoDaoError::UpdateRoom {
                code: code.clone(),
                source,
            })?;
        Ok(result.matched_count > 0)
    }

    async fn swap_validation_status(
        &self,
        code: String,
        expected: Option<String>,
        next: Option<String>,
    ) -> MongoResult<bool> {
        let expected = expected.map(Bson::String).unwrap_or(Bson::Null);
        let next = next.map(Bson::String).unwrap_or(Bson::Null);
        let result = self
            .rooms()
            .await
            .update_one(
                doc! {"_id": &code, "validation_status": expected},
                doc! {"$set": {"validation_status": next}},
            )
            .await
            .map_err(|source| MongoDaoError::UpdateRoom {
                code: code.clone(),
                source,
            })?;
        Ok(result.matched_count > 0)
    }

    async fn set_winner_team(&self, code: String, team: TeamSide) -> MongoResult<()> {
        let team = serialize_to_bson(&team).unwrap_or(Bson::Null);
        self.rooms()
            .await
            .update_one(doc! {"_id": &code}, doc! {"$set": {"winner_team": team}})
            .await
            .map_err(|source| MongoDaoError::UpdateRoom {
                code: code.clone(),
                source,
            })?;
        Ok(())
    }

    async fn finalize_room(&self, code: String, history: GameHistoryEntity) -> MongoResult<()> {
        // The game_stopped flip is the mutual-exclusion point; only the
        // winner of that update writes the snapshot.
        let result = self
            .rooms()
            .await
            .update_one(
                doc! {"_id": &code, "game_stopped": false},
                doc! {"$set": {"game_stopped": true}},
            )
            .await
            .map_err(|source| MongoDaoError::UpdateRoom {
                code: code.clone(),
                source,
            })?;
        if result.matched_count == 0 {
            return Err(MongoDaoError::CorruptDocument {
                collection: ROOM_COLLECTION,
                detail: format!("room `{code}` is missing or already finalized"),
            });
        }

        let document: MongoHistoryDocument = history.into();
        if let Err(source) = self.histories().await.insert_one(document).await {
            // Best-effort rollback so a later finalize can retry.
            let _ = self
                .rooms()
                .await
                .update_one(doc! {"_id": &code}, doc! {"$set": {"game_stopped": false}})
                .await;
            return Err(MongoDaoError::History { code, source });
        }

        Ok(())
    }

    async fn find_history(&self, code: String) -> MongoResult<Option<GameHistoryEntity>> {
        let document = self
            .histories()
            .await
            .find_one(doc! {"room_code": &code})
            .await
            .map_err(|source| MongoDaoError::History {
                code: code.clone(),
                source,
            })?;

        document.map(GameHistoryEntity::try_from).transpose()
    }
}

impl RoomStore for MongoRoomStore {
    fn find_room(&self, code: &str) -> BoxFuture<'static, StorageResult<Option<RoomEntity>>> {
        let store = self.clone();
        let code = code.to_owned();
        Box::pin(async move { store.find_room(code).await.map_err(Into::into) })
    }

    fn missions_by_kind(
        &self,
        kind: MissionKind,
    ) -> BoxFuture<'static, StorageResult<Vec<MissionEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.missions_by_kind(kind).await.map_err(Into::into) })
    }

    fn event_catalog(&self) -> BoxFuture<'static, StorageResult<Vec<EventEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.event_catalog().await.map_err(Into::into) })
    }

    fn player_missions(
        &self,
        room_code: &str,
    ) -> BoxFuture<'static, StorageResult<Vec<PlayerMissionEntity>>> {
        let store = self.clone();
        let code = room_code.to_owned();
        Box::pin(async move { store.load_player_missions(code).await.map_err(Into::into) })
    }

    fn pending_choices(
        &self,
        room_code: &str,
    ) -> BoxFuture<'static, StorageResult<Vec<PendingChoiceEntity>>> {
        let store = self.clone();
        let code = room_code.to_owned();
        Box::pin(async move { store.load_pending_choices(code).await.map_err(Into::into) })
    }

    fn insert_player_missions(
        &self,
        missions: Vec<PlayerMissionEntity>,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .insert_player_missions(missions)
                .await
                .map_err(Into::into)
        })
    }

    fn insert_pending_choices(
        &self,
        choices: Vec<PendingChoiceEntity>,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .insert_pending_choices(choices)
                .await
                .map_err(Into::into)
        })
    }

    fn record_mission_decision(
        &self,
        room_code: &str,
        player_id: Uuid,
        kind: MissionKind,
        validated: bool,
        points_earned: i32,
    ) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        let code = room_code.to_owned();
        Box::pin(async move {
            store
                .record_mission_decision(code, player_id, kind, validated, points_earned)
                .await
                .map_err(Into::into)
        })
    }

    fn room_events(
        &self,
        room_code: &str,
    ) -> BoxFuture<'static, StorageResult<Vec<RoomEventEntity>>> {
        let store = self.clone();
        let code = room_code.to_owned();
        Box::pin(async move { store.load_room_events(code).await.map_err(Into::into) })
    }

    fn insert_room_events(
        &self,
        events: Vec<RoomEventEntity>,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.insert_room_events(events).await.map_err(Into::into) })
    }

    fn mark_event_appeared(
        &self,
        room_code: &str,
        event_id: Uuid,
        at: SystemTime,
    ) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        let code = room_code.to_owned();
        Box::pin(async move {
            store
                .mark_event_appeared(code, event_id, at)
                .await
                .map_err(Into::into)
        })
    }

    fn decide_event(
        &self,
        room_code: &str,
        event_id: Uuid,
        winner: Option<TeamSide>,
    ) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        let code = room_code.to_owned();
        Box::pin(async move {
            store
                .decide_event(code, event_id, winner)
                .await
                .map_err(Into::into)
        })
    }

    fn pause_for_event(
        &self,
        room_code: &str,
        at: SystemTime,
    ) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        let code = room_code.to_owned();
        Box::pin(async move { store.pause_for_event(code, at).await.map_err(Into::into) })
    }

    fn resume_from_event(
        &self,
        room_code: &str,
        at: SystemTime,
    ) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        let code = room_code.to_owned();
        Box::pin(async move { store.resume_from_event(code, at).await.map_err(Into::into) })
    }

    fn swap_validation_status(
        &self,
        room_code: &str,
        expected: Option<String>,
        next: Option<String>,
    ) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        let code = room_code.to_owned();
        Box::pin(async move {
            store
                .swap_validation_status(code, expected, next)
                .await
                .map_err(Into::into)
        })
    }

    fn set_winner_team(
        &self,
        room_code: &str,
        team: TeamSide,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        let code = room_code.to_owned();
        Box::pin(async move { store.set_winner_team(code, team).await.map_err(Into::into) })
    }

    fn finalize_room(
        &self,
        room_code: &str,
        history: GameHistoryEntity,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        let code = room_code.to_owned();
        Box::pin(async move { store.finalize_room(code, history).await.map_err(Into::into) })
    }

    fn find_history(
        &self,
        room_code: &str,
    ) -> BoxFuture<'static, StorageResult<Option<GameHistoryEntity>>> {
        let store = self.clone();
        let code = room_code.to_owned();
        Box::pin(async move { store.find_history(code).await.map_err(Into::into) })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.ping().await.map_err(Into::into) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.reconnect().await.map_err(Into::into) })
    }
}
