//! Scripted verification system.
//!
//! Each collection serves a fixed list of pages. The first request (no
//! cursor) gets page 0; a request with cursor `c` gets the first page whose
//! predecessor's `next` equals `c`. Unknown cursors answer 404.

use std::sync::{Mutex, MutexGuard};

use cred_remote::{
    Page, RemoteError, VerificationClient, VerifiedBoardCertificate, VerifiedLicense,
    VerifiedProvider,
};

/// Split `rows` into pages of `page_size` linked by `page-N` cursors, each
/// reporting the full count.
pub fn paged<T: Clone>(rows: Vec<T>, page_size: usize) -> Vec<Page<T>> {
    let count = rows.len() as u64;
    let chunks: Vec<Vec<T>> = if rows.is_empty() {
        vec![Vec::new()]
    } else {
        rows.chunks(page_size.max(1)).map(<[T]>::to_vec).collect()
    };
    let last = chunks.len() - 1;
    chunks
        .into_iter()
        .enumerate()
        .map(|(i, results)| Page {
            count,
            next: (i < last).then(|| format!("page-{}", i + 1)),
            results,
        })
        .collect()
}

struct Script<T> {
    pages: Vec<Page<T>>,
    /// Page index whose request fails.
    fail_at: Option<(usize, RemoteError)>,
    cursors: Vec<Option<String>>,
}

impl<T> Default for Script<T> {
    fn default() -> Self {
        Self {
            pages: Vec::new(),
            fail_at: None,
            cursors: Vec::new(),
        }
    }
}

impl<T: Clone> Script<T> {
    fn serve(&mut self, cursor: Option<String>) -> Result<Page<T>, RemoteError> {
        self.cursors.push(cursor.clone());
        let idx = match &cursor {
            None => Some(0),
            Some(c) => (1..self.pages.len()).find(|&j| self.pages[j - 1].next.as_ref() == Some(c)),
        };
        let Some(idx) = idx.filter(|&i| i < self.pages.len()) else {
            return Err(RemoteError::Api {
                status: 404,
                message: format!("no page for cursor {cursor:?}"),
            });
        };
        if let Some((at, err)) = &self.fail_at {
            if *at == idx {
                return Err(err.clone());
            }
        }
        Ok(self.pages[idx].clone())
    }
}

#[derive(Default)]
struct State {
    providers: Script<VerifiedProvider>,
    licenses: Script<VerifiedLicense>,
    board_certificates: Script<VerifiedBoardCertificate>,
}

#[derive(Default)]
pub struct FakeVerification {
    state: Mutex<State>,
}

impl FakeVerification {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn set_provider_pages(&self, pages: Vec<Page<VerifiedProvider>>) {
        self.lock().providers.pages = pages;
    }

    pub fn set_license_pages(&self, pages: Vec<Page<VerifiedLicense>>) {
        self.lock().licenses.pages = pages;
    }

    pub fn set_board_certificate_pages(&self, pages: Vec<Page<VerifiedBoardCertificate>>) {
        self.lock().board_certificates.pages = pages;
    }

    pub fn fail_license_page(&self, index: usize, err: RemoteError) {
        self.lock().licenses.fail_at = Some((index, err));
    }

    /// Cursors requested for the licenses collection, in order.
    pub fn license_cursors(&self) -> Vec<Option<String>> {
        self.lock().licenses.cursors.clone()
    }

    pub fn provider_cursors(&self) -> Vec<Option<String>> {
        self.lock().providers.cursors.clone()
    }
}

#[async_trait::async_trait]
impl VerificationClient for FakeVerification {
    async fn providers_page(
        &self,
        cursor: Option<String>,
    ) -> Result<Page<VerifiedProvider>, RemoteError> {
        self.lock().providers.serve(cursor)
    }

    async fn licenses_page(
        &self,
        cursor: Option<String>,
    ) -> Result<Page<VerifiedLicense>, RemoteError> {
        self.lock().licenses.serve(cursor)
    }

    async fn board_certificates_page(
        &self,
        cursor: Option<String>,
    ) -> Result<Page<VerifiedBoardCertificate>, RemoteError> {
        self.lock().board_certificates.serve(cursor)
    }
}
