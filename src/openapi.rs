use crate::error::ApiErrorBody;
use crate::interactions::{FollowToggle, LikeToggle};
use crate::messaging::ConversationThread;
use crate::models::{
    Conversation, CreatorCard, DesignCard, Message, Notification, NotificationItem, NotificationKind, Profile,
    ProfilePage, ProfileSummary,
};
use crate::profiles::ProfileForm;
use crate::routes::{DeleteDesignRequest, DesignUploadForm, MarkReadRequest, MarkReadResponse, SendMessageRequest, UnreadCount};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::routes::create_design,
        crate::routes::list_designs,
        crate::routes::get_design,
        crate::routes::toggle_like,
        crate::routes::record_view,
        crate::routes::delete_design,
        crate::routes::list_user_designs,
        crate::routes::get_own_profile,
        crate::routes::update_profile,
        crate::routes::get_profile_page,
        crate::routes::toggle_follow,
        crate::routes::list_creators,
        crate::routes::list_conversations,
        crate::routes::get_conversation,
        crate::routes::send_message,
        crate::routes::list_notifications,
        crate::routes::unread_count,
        crate::routes::mark_notifications_read,
    ),
    components(schemas(
        DesignCard, DesignUploadForm, DeleteDesignRequest, LikeToggle, FollowToggle,
        Profile, ProfileSummary, ProfileForm, ProfilePage, CreatorCard,
        Message, Conversation, ConversationThread, SendMessageRequest,
        Notification, NotificationKind, NotificationItem, UnreadCount, MarkReadRequest, MarkReadResponse,
        ApiErrorBody,
    )),
    modifiers(&BearerAuth),
    tags(
        (name = "designs", description = "Upload, feed, likes, views and deletion"),
        (name = "profiles", description = "Profiles, follows and the creators directory"),
        (name = "messages", description = "Direct messages"),
        (name = "notifications", description = "Activity notifications"),
    )
)]
pub struct ApiDoc;

struct BearerAuth;

impl utoipa::Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer",
            SecurityScheme::Http(HttpBuilder::new().scheme(HttpAuthScheme::Bearer).bearer_format("JWT").build()),
        );
    }
}
