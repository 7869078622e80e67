//! Likes
//!
//! Every call here is a secondary path: failures are folded into safe values
//! (`false`, `0`, empty) or into a [`LikeResponse`] carrying the error, never
//! returned as `Err`.

use crate::client::ApiClient;
use crate::types::{CountResponse, IsLikedResponse, LikeResponse, LikedItemsResponse, OneOrMany};
use serde_json::json;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct LikingClient {
    api: ApiClient,
}

impl LikingClient {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }

    pub async fn like(&self, item: &str, user: &str) -> LikeResponse {
        self.mutate("/Liking/like", item, user, "Failed to like item")
            .await
    }

    pub async fn unlike(&self, item: &str, user: &str) -> LikeResponse {
        self.mutate("/Liking/unlike", item, user, "Failed to unlike item")
            .await
    }

    async fn mutate(&self, path: &str, item: &str, user: &str, fallback: &str) -> LikeResponse {
        match self
            .api
            .post::<_, LikeResponse>(path, &json!({ "item": item, "user": user }))
            .await
        {
            Ok(response) => response,
            // A status error carries the server's message; anything else gets the generic one
            Err(e) if e.status().is_some() => {
                LikeResponse::failed(e.message())
            }
            Err(e) => {
                debug!(path, item, error = %e, "Like request failed");
                LikeResponse::failed(fallback)
            }
        }
    }

    /// Whether `user` likes `item`; false when unavailable
    pub async fn is_liked(&self, item: &str, user: &str) -> bool {
        self.api
            .post::<_, OneOrMany<IsLikedResponse>>(
                "/Liking/_isLiked",
                &json!({ "item": item, "user": user }),
            )
            .await
            .map(|rows| rows.first_or_default().liked)
            .unwrap_or(false)
    }

    /// Like count of `item`; 0 when unavailable
    pub async fn count_for_item(&self, item: &str) -> u64 {
        self.api
            .post::<_, OneOrMany<CountResponse>>("/Liking/_countForItem", &json!({ "item": item }))
            .await
            .map(|rows| rows.first_or_default().n)
            .unwrap_or(0)
    }

    /// Items liked by `user`; empty when unavailable
    pub async fn liked_items(&self, user: &str) -> Vec<String> {
        self.api
            .post::<_, OneOrMany<LikedItemsResponse>>("/Liking/_likedItems", &json!({ "user": user }))
            .await
            .map(|rows| rows.first_or_default().items)
            .unwrap_or_default()
    }
}

/// Locally displayed like state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LikeState {
    pub liked: bool,
    pub count: u64,
}

impl LikeState {
    /// State after the user flips their like
    pub fn toggled(self) -> Self {
        if self.liked {
            Self {
                liked: false,
                count: self.count.saturating_sub(1),
            }
        } else {
            Self {
                liked: true,
                count: self.count + 1,
            }
        }
    }
}

/// Optimistic like button for one item and user.
///
/// [`toggle`](Self::toggle) applies the change locally before the server
/// answers. An explicit server rejection rolls it back; otherwise the local
/// state stands until the next [`fetch`](Self::fetch), which overwrites it
/// with the server's view. Between a toggle and the next fetch the local
/// count can differ from the server's (for example when other users like the
/// item meanwhile).
#[derive(Debug, Clone)]
pub struct LikeTracker {
    client: LikingClient,
    item: String,
    user: String,
    state: LikeState,
}

impl LikeTracker {
    pub fn new(client: LikingClient, item: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            client,
            item: item.into(),
            user: user.into(),
            state: LikeState::default(),
        }
    }

    pub fn state(&self) -> LikeState {
        self.state
    }

    /// Reconcile with the server
    pub async fn fetch(&mut self) -> LikeState {
        let (liked, count) = tokio::join!(
            self.client.is_liked(&self.item, &self.user),
            self.client.count_for_item(&self.item)
        );
        self.state = LikeState { liked, count };
        self.state
    }

    /// Flip the like optimistically and send it
    pub async fn toggle(&mut self) -> LikeResponse {
        let previous = self.state;
        self.state = previous.toggled();

        let response = if previous.liked {
            self.client.unlike(&self.item, &self.user).await
        } else {
            self.client.like(&self.item, &self.user).await
        };

        if !response.is_ok() {
            self.state = previous;
        }
        response
    }
}
