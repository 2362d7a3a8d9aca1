//! Client services.

pub mod engagement;
pub mod notifications;
pub mod post;
pub mod profile;
pub mod search;
pub mod session;
pub mod timeline;
pub mod uploads;

pub use engagement::{EngagementService, RelationKind, RelationState};
pub use notifications::NotificationService;
pub use post::{CreatePostInput, CreatedPost, PostService, UploadFailure};
pub use profile::ProfileService;
pub use search::{SearchFeed, SearchResults};
pub use session::{AuthSnapshot, SessionService, SignUpInput, UpdateProfileInput};
pub use timeline::{Page, ProfileTab, TimelineService};
pub use uploads::{UploadOutcome, UploadService, UploadSource};
