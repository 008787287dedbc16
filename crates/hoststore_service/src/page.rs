//! CMS pages stored at `page:<name>`.

use crate::config::ServiceConfig;
use crate::entity::{AdminPage, ContentType, PageEntity};
use crate::error::{ServiceError, ServiceResult};
use crate::normalize::normalize_page_id;
use hoststore_core::{key, Context, Store};
use std::ops::ControlFlow;

const PAGE_PREFIX: &str = "page:";

/// Page CRUD over a [`Store`].
#[derive(Debug, Clone)]
pub struct PageService {
    store: Store,
    config: ServiceConfig,
}

impl PageService {
    /// Creates a page service.
    #[must_use]
    pub fn new(store: Store, config: ServiceConfig) -> Self {
        Self { store, config }
    }

    /// Looks a page up by name, normalizing it first.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::PageNotFound`] for an absent page and a
    /// core integrity error if the stored record names another page.
    pub fn get_page(&self, ctx: &Context, name: &str) -> ServiceResult<PageEntity> {
        let name = page_name(name)?;
        self.store
            .get_checked(ctx, &key!("page:%s", name)?, &name)?
            .ok_or(ServiceError::PageNotFound { name })
    }

    /// Creates a page; fails if the name is taken.
    ///
    /// # Errors
    ///
    /// Returns a validation error for an empty name or an unknown content
    /// type, and [`ServiceError::PageAlreadyExists`] for a taken name.
    pub fn create_page(&self, ctx: &Context, page: &AdminPage) -> ServiceResult<()> {
        let name = page_name(&page.name)?;
        let content_type = parse_content_type(&page.content_type)?;
        let key = key!("page:%s", name)?;

        self.store.transaction(ctx, false, |txn| -> ServiceResult<()> {
            if self
                .store
                .get_checked::<PageEntity>(txn, &key, &name)?
                .is_some()
            {
                return Err(ServiceError::PageAlreadyExists { name: name.clone() });
            }
            let entity = PageEntity {
                name: name.clone(),
                title: page.title.clone(),
                content: page.content.clone(),
                content_type,
                created_at: self.store.clock().now().timestamp(),
                ..PageEntity::default()
            };
            self.store.set_record(txn, &key, &entity, None)?;
            tracing::debug!(page = %name, "created page");
            Ok(())
        })
    }

    /// Writes a page, renaming it when `prev` names another page.
    ///
    /// A rename checks the new name is free, removes the old key and
    /// writes the new one in a single transaction. The creation time of
    /// the page being replaced is kept.
    ///
    /// # Errors
    ///
    /// Returns a validation error for an empty name or an unknown content
    /// type, and [`ServiceError::PageAlreadyExists`] if a rename target is
    /// taken.
    pub fn update_page(&self, ctx: &Context, page: &AdminPage) -> ServiceResult<()> {
        let name = page_name(&page.name)?;
        let prev = normalize_page_id(&page.prev);
        let content_type = parse_content_type(&page.content_type)?;
        let key = key!("page:%s", name)?;

        self.store.transaction(ctx, false, |txn| -> ServiceResult<()> {
            let existing = if !prev.is_empty() && prev != name {
                if self
                    .store
                    .get_checked::<PageEntity>(txn, &key, &name)?
                    .is_some()
                {
                    return Err(ServiceError::PageAlreadyExists { name: name.clone() });
                }
                let prev_key = key!("page:%s", prev)?;
                let old = self.store.get_checked::<PageEntity>(txn, &prev_key, &prev)?;
                self.store.remove(txn, &prev_key)?;
                tracing::debug!(from = %prev, to = %name, "renaming page");
                old
            } else {
                self.store.get_checked::<PageEntity>(txn, &key, &name)?
            };

            let created_at = existing
                .map(|p| p.created_at)
                .unwrap_or_else(|| self.store.clock().now().timestamp());
            let entity = PageEntity {
                name: name.clone(),
                title: page.title.clone(),
                content: page.content.clone(),
                content_type,
                created_at,
                ..PageEntity::default()
            };
            self.store.set_record(txn, &key, &entity, None)?;
            Ok(())
        })
    }

    /// Removes a page. Removing an absent page is not an error.
    ///
    /// # Errors
    ///
    /// Returns a validation error for an empty name.
    pub fn remove_page(&self, ctx: &Context, name: &str) -> ServiceResult<()> {
        let name = page_name(name)?;
        self.store.remove(ctx, &key!("page:%s", name)?)?;
        Ok(())
    }

    /// Visits every page in name order until `visit` breaks.
    ///
    /// # Errors
    ///
    /// Returns store and codec errors.
    pub fn enum_pages<F>(&self, ctx: &Context, mut visit: F) -> ServiceResult<()>
    where
        F: FnMut(PageEntity) -> ControlFlow<()>,
    {
        self.store
            .enumerate_records(ctx, PAGE_PREFIX, self.config.batch_size, |_, page| {
                Ok::<_, ServiceError>(visit(page))
            })
    }
}

fn page_name(raw: &str) -> ServiceResult<String> {
    let name = normalize_page_id(raw);
    if name.is_empty() {
        return Err(ServiceError::validation("page name is empty"));
    }
    Ok(name)
}

fn parse_content_type(raw: &str) -> ServiceResult<ContentType> {
    ContentType::parse(raw)
        .ok_or_else(|| ServiceError::validation(format!("invalid content type {raw:?}")))
}
