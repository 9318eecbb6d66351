use crate::cascade::CascadeHandle;

pub struct AppState {
    pub cascade: CascadeHandle,
}
