//! # Document Composer
//!
//! Creates, edits and deletes documents together with every side effect
//! they carry: number allocation, stock, the source document's status, the
//! party ledger and payment application.
//!
//! ## Create Pipeline
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  validate payload ──► resolve company/branch/party/items/source         │
//! │        │                         │                                      │
//! │        │  (nothing written yet)  ▼                                      │
//! │        │                 price lines, aggregate totals                  │
//! │        ▼                         │                                      │
//! │  allocate number ◄───────────────┘                                      │
//! │        │                                                                │
//! │        ▼                 ┌─────────── Journal ───────────┐              │
//! │  insert header ─────────►│ DeleteDocument                │              │
//! │  insert lines            │                               │              │
//! │  stock plan ────────────►│ Stock(reversed) × n           │              │
//! │  consume source ────────►│ Status(back)                  │              │
//! │  payments / advance ────►│ Payment(−δ), Advance(−δ)      │              │
//! │  ledger postings ───────►│ Post(opposite)                │              │
//! │                          └───────────────┬───────────────┘              │
//! │                                          │ on error: replay newest-first│
//! │                                          ▼                              │
//! │                               original error returned                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Delete and line edits run the same effects backwards from the stored
//! rows, under the same journal.

mod effects;
mod journal;
mod payload;

pub use payload::{AllocationPayload, DocumentPatch, DocumentPayload, LinePayload};

use std::collections::{HashMap, HashSet};

use chrono::Utc;
use tracing::{debug, info};
use uuid::Uuid;

use billbook_core::tax::{is_interstate, DocumentDiscount, DocumentTotals};
use billbook_core::validation::validate_reference;
use billbook_core::{
    BalanceEffect, Branch, Company, Document, DocumentDetail, DocumentLine, DocumentPolicy,
    DocumentStatus, DocumentType, EntrySide, Item, Money, Party, PaymentAllocation, PaymentStatus,
    StockEffect, ValidationError,
};
use billbook_db::{Database, StockChange};

use crate::balance::BalanceLedger;
use crate::error::{EngineError, EngineResult};
use crate::inventory::InventoryLedger;
use crate::sequence::SequenceAllocator;
use effects::{price_lines, stock_plan, SourceContext};
use journal::{Compensator, Journal, Undo};

/// References of a new document, loaded before anything is written.
struct Resolved {
    company: Company,
    branch: Branch,
    party: Party,
    items: HashMap<String, Item>,
    source: Option<SourceContext>,
    /// Payments only: each target with the amount applied to it.
    allocations: Vec<(Document, Money)>,
}

#[derive(Debug, Clone)]
pub struct DocumentComposer {
    db: Database,
    sequences: SequenceAllocator,
    inventory: InventoryLedger,
    balances: BalanceLedger,
}

impl DocumentComposer {
    pub fn new(
        db: Database,
        sequences: SequenceAllocator,
        inventory: InventoryLedger,
        balances: BalanceLedger,
    ) -> Self {
        DocumentComposer {
            db,
            sequences,
            inventory,
            balances,
        }
    }

    // =========================================================================
    // Create
    // =========================================================================

    pub async fn create(
        &self,
        document_type: DocumentType,
        payload: &DocumentPayload,
    ) -> EngineResult<DocumentDetail> {
        let policy = document_type.policy();
        payload.validate(policy)?;
        let resolved = self.resolve(policy, payload).await?;

        let id = Uuid::new_v4().to_string();
        let interstate = is_interstate(
            resolved.company.tax_id.as_deref(),
            resolved.party.tax_id.as_deref(),
        );
        let discount = payload.discount();
        let priced = if policy.has_lines {
            Some(price_lines(
                &id,
                &payload.lines,
                &resolved.items,
                resolved.party.kind,
                interstate,
                discount,
            )?)
        } else {
            None
        };

        let document_date = payload.document_date.unwrap_or_else(|| Utc::now().date_naive());
        let number = self
            .sequences
            .allocate(&resolved.company.id, &resolved.branch, document_type, document_date)
            .await?;

        let now = Utc::now();
        let mut document = Document {
            id,
            company_id: resolved.company.id.clone(),
            branch_id: resolved.branch.id.clone(),
            document_type,
            document_number: number.document_number,
            sequence_number: number.sequence_number,
            fiscal_year: number.fiscal_year.to_string(),
            document_date,
            party_id: resolved.party.id.clone(),
            source_id: payload.source_id.clone(),
            status: policy.initial_status,
            payment_status: PaymentStatus::NotApplicable,
            is_interstate: interstate,
            subtotal_cents: 0,
            cgst_cents: 0,
            sgst_cents: 0,
            igst_cents: 0,
            tax_cents: 0,
            discount_bps: 0,
            discount_cents: 0,
            total_cents: 0,
            paid_cents: 0,
            balance_cents: 0,
            applied_cents: 0,
            advance_cents: 0,
            notes: payload.notes.clone(),
            created_at: now,
            updated_at: now,
        };

        let lines = match priced {
            Some(priced) => {
                apply_totals(&mut document, &priced.totals, discount);
                priced.lines
            }
            None => {
                let amount = Money::from_cents(payload.amount_cents.unwrap_or_default());
                let allocated: Money = resolved.allocations.iter().map(|(_, a)| *a).sum();
                document.subtotal_cents = amount.cents();
                document.total_cents = amount.cents();
                document.paid_cents = amount.cents();
                document.applied_cents = allocated.cents();
                document.advance_cents = (amount - allocated).cents();
                Vec::new()
            }
        };

        if policy.is_return() {
            if let Some(parent) = &resolved.source {
                document.status = DocumentPolicy::return_status(parent.document.payment_status);
                let applied = document.total().min(parent.document.balance().max(Money::zero()));
                document.applied_cents = applied.cents();
                document.advance_cents = (document.total() - applied).cents();
            }
        }

        let mut journal = Journal::new("create", &document.id);
        if let Err(err) = self.write_new(&mut journal, &document, &lines, &resolved).await {
            journal.rollback(&self.compensator(), &err).await;
            return Err(err);
        }

        info!(
            id = %document.id,
            number = %document.document_number,
            document_type = %document_type,
            total = %document.total(),
            "Created document"
        );
        self.detail(&document.id).await
    }

    async fn write_new(
        &self,
        journal: &mut Journal,
        document: &Document,
        lines: &[DocumentLine],
        resolved: &Resolved,
    ) -> EngineResult<()> {
        let documents = self.db.documents();
        documents.insert(document).await?;
        journal.record(Undo::DeleteDocument {
            id: document.id.clone(),
        });
        if !lines.is_empty() {
            documents.insert_lines(lines).await?;
        }

        let tracked = tracked_items(resolved.items.values());
        for change in stock_plan(document, lines, &tracked, resolved.source.as_ref()) {
            self.apply_stock(journal, change).await?;
        }

        if let Some(source) = &resolved.source {
            let policy = document.policy();
            if let Some(consumed) = policy.consumed_source_status(source.document.document_type) {
                self.move_status(journal, &source.document, consumed).await?;
            }
        }

        let policy = document.policy();
        let Some(side) = policy.entry_side(resolved.party.kind) else {
            return Ok(());
        };

        if policy.balance == BalanceEffect::Settlement {
            for (target, amount) in &resolved.allocations {
                self.apply_payment(journal, &target.id, *amount).await?;
                let description = format!("Payment against {}", target.document_number);
                self.post(journal, document, side, *amount, description).await?;
            }
            let advance = Money::from_cents(document.advance_cents);
            if advance.is_positive() {
                let description = format!("Unallocated {}", document.document_number);
                self.post(journal, document, side, advance, description).await?;
                self.adjust_advance(journal, &document.party_id, advance).await?;
            }
            if !resolved.allocations.is_empty() {
                let now = Utc::now();
                let rows: Vec<PaymentAllocation> = resolved
                    .allocations
                    .iter()
                    .map(|(target, amount)| PaymentAllocation {
                        id: Uuid::new_v4().to_string(),
                        payment_id: document.id.clone(),
                        document_id: target.id.clone(),
                        amount_cents: amount.cents(),
                        created_at: now,
                    })
                    .collect();
                // removed with the header on rollback
                documents.insert_allocations(&rows).await?;
            }
            return Ok(());
        }

        if policy.is_return() {
            if let Some(parent) = &resolved.source {
                let applied = Money::from_cents(document.applied_cents);
                if applied.is_positive() {
                    self.apply_payment(journal, &parent.document.id, applied).await?;
                }
                let advance = Money::from_cents(document.advance_cents);
                if advance.is_positive() {
                    self.adjust_advance(journal, &document.party_id, advance).await?;
                }
            }
        }

        self.post_total(journal, document, side).await
    }

    // =========================================================================
    // Update
    // =========================================================================

    /// Applies a status change, a content edit or a notes change.
    pub async fn update(&self, id: &str, patch: &DocumentPatch) -> EngineResult<DocumentDetail> {
        validate_reference("id", id)?;
        patch.validate()?;
        let document = self.fetch(id).await?;

        if let Some(status) = patch.status {
            self.change_status(&document, status).await?;
        } else if patch.changes_content() {
            self.edit_content(&document, patch).await?;
        } else if let Some(notes) = &patch.notes {
            document.ensure_unlocked()?;
            let mut updated = document.clone();
            updated.notes = Some(notes.clone());
            updated.updated_at = Utc::now();
            self.db.documents().update(&updated).await?;
            debug!(id = %id, "Updated document notes");
        }

        self.detail(id).await
    }

    async fn change_status(&self, document: &Document, to: DocumentStatus) -> EngineResult<()> {
        let policy = document.policy();
        policy.check_transition(document.status, to)?;
        if document.status == to {
            return Ok(());
        }

        let mut journal = Journal::new("update", &document.id);
        if let Err(err) = self.transition(&mut journal, document, to).await {
            journal.rollback(&self.compensator(), &err).await;
            return Err(err);
        }

        info!(
            id = %document.id,
            number = %document.document_number,
            from = %document.status,
            to = %to,
            "Changed document status"
        );
        Ok(())
    }

    async fn transition(
        &self,
        journal: &mut Journal,
        document: &Document,
        to: DocumentStatus,
    ) -> EngineResult<()> {
        // a cancelled order gives its reservation back
        if document.policy().stock == StockEffect::Reserve && to == DocumentStatus::Cancelled {
            let lines = self.db.documents().lines(&document.id).await?;
            let tracked = self.tracked_for(&document.company_id, &lines).await?;
            let plan = stock_plan(document, &lines, &tracked, None);
            for change in plan.iter().rev() {
                self.withdraw_stock(journal, change).await?;
            }
        }
        self.move_status(journal, document, to).await
    }

    async fn edit_content(&self, document: &Document, patch: &DocumentPatch) -> EngineResult<()> {
        let policy = document.policy();
        if policy.is_return() || !policy.has_lines {
            return Err(ValidationError::mismatch(
                "lines",
                format!("{} cannot be edited; delete and re-create it", document.document_type),
            )
            .into());
        }
        document.ensure_unlocked()?;
        if document.status != policy.initial_status {
            return Err(EngineError::DocumentLocked {
                id: document.id.clone(),
                reason: format!("{} is {}", document.document_type, document.status),
            });
        }
        self.ensure_unreferenced(document).await?;

        let party = self
            .db
            .parties()
            .get(&document.party_id, &document.company_id)
            .await?
            .ok_or_else(|| EngineError::not_found("Party", &document.party_id))?;
        let old_lines = self.db.documents().lines(&document.id).await?;
        let payloads: Vec<LinePayload> = match &patch.lines {
            Some(lines) => lines.clone(),
            None => old_lines.iter().map(LinePayload::from_line).collect(),
        };
        let discount = if patch.discount_bps.is_some() || patch.discount_cents.is_some() {
            DocumentDiscount::resolve(patch.discount_bps, patch.discount_cents.map(Money::from_cents))
        } else {
            stored_discount(document)
        };

        let item_ids = payloads
            .iter()
            .map(|l| l.item_id.as_str())
            .chain(old_lines.iter().map(|l| l.item_id.as_str()));
        let items = self.resolve_items(&document.company_id, item_ids).await?;
        let priced = price_lines(
            &document.id,
            &payloads,
            &items,
            party.kind,
            document.is_interstate,
            discount,
        )?;

        let mut updated = document.clone();
        apply_totals(&mut updated, &priced.totals, discount);
        if patch.notes.is_some() {
            updated.notes = patch.notes.clone();
        }
        updated.updated_at = Utc::now();

        let source = self.load_source(document).await?;
        let tracked = tracked_items(items.values());
        let old_plan = stock_plan(document, &old_lines, &tracked, source.as_ref());
        let new_plan = stock_plan(&updated, &priced.lines, &tracked, source.as_ref());

        let mut journal = Journal::new("update", &document.id);
        let edit = ContentEdit {
            before: document,
            after: &updated,
            old_lines,
            new_lines: &priced.lines,
            old_plan,
            new_plan,
            side: policy.entry_side(party.kind),
        };
        if let Err(err) = self.rewrite(&mut journal, edit).await {
            journal.rollback(&self.compensator(), &err).await;
            return Err(err);
        }

        info!(
            id = %document.id,
            number = %document.document_number,
            total_before = %document.total(),
            total_after = %updated.total(),
            "Edited document lines"
        );
        Ok(())
    }

    async fn rewrite(&self, journal: &mut Journal, edit: ContentEdit<'_>) -> EngineResult<()> {
        for change in edit.old_plan.iter().rev() {
            self.withdraw_stock(journal, change).await?;
        }
        self.reverse_ledger(journal, edit.before).await?;

        let documents = self.db.documents();
        documents.replace_lines(&edit.before.id, edit.new_lines).await?;
        journal.record(Undo::Lines {
            document_id: edit.before.id.clone(),
            lines: edit.old_lines,
        });
        documents.update(edit.after).await?;
        journal.record(Undo::Header(Box::new(edit.before.clone())));

        for change in edit.new_plan {
            self.apply_stock(journal, change).await?;
        }
        match edit.side {
            Some(side) => self.post_total(journal, edit.after, side).await,
            None => Ok(()),
        }
    }

    // =========================================================================
    // Delete
    // =========================================================================

    /// Deletes a document after undoing everything it applied.
    pub async fn delete(&self, id: &str) -> EngineResult<Document> {
        validate_reference("id", id)?;
        let document = self.fetch(id).await?;
        document.ensure_unlocked()?;
        self.ensure_unreferenced(&document).await?;

        let lines = self.db.documents().lines(id).await?;
        let source = self.load_source(&document).await?;
        let tracked = self.tracked_for(&document.company_id, &lines).await?;
        let plan = stock_plan(&document, &lines, &tracked, source.as_ref());

        let mut journal = Journal::new("delete", id);
        if let Err(err) = self.withdraw(&mut journal, &document, &plan, source.as_ref()).await {
            journal.rollback(&self.compensator(), &err).await;
            return Err(err);
        }

        info!(
            id = %document.id,
            number = %document.document_number,
            document_type = %document.document_type,
            "Deleted document"
        );
        Ok(document)
    }

    async fn withdraw(
        &self,
        journal: &mut Journal,
        document: &Document,
        plan: &[StockChange],
        source: Option<&SourceContext>,
    ) -> EngineResult<()> {
        let policy = document.policy();

        for change in plan.iter().rev() {
            self.withdraw_stock(journal, change).await?;
        }

        if policy.balance == BalanceEffect::Settlement {
            for allocation in self.db.documents().allocations(&document.id).await? {
                let amount = Money::from_cents(allocation.amount_cents);
                self.apply_payment(journal, &allocation.document_id, -amount).await?;
            }
        } else if let (true, Some(parent)) = (policy.is_return(), source) {
            let applied = Money::from_cents(document.applied_cents);
            if applied.is_positive() {
                self.apply_payment(journal, &parent.document.id, -applied).await?;
            }
        }

        let advance = Money::from_cents(document.advance_cents);
        if advance.is_positive() {
            self.adjust_advance(journal, &document.party_id, -advance).await?;
        }

        if let Some(source) = source {
            let consumed = policy.consumed_source_status(source.document.document_type);
            if consumed == Some(source.document.status) {
                let initial = source.document.policy().initial_status;
                self.move_status(journal, &source.document, initial).await?;
            }
        }

        self.reverse_ledger(journal, document).await?;

        // lines and allocations cascade; nothing can undo this step
        self.db.documents().delete(&document.id).await?;
        Ok(())
    }

    // =========================================================================
    // Read
    // =========================================================================

    /// Header, lines and allocations of one document.
    pub async fn detail(&self, id: &str) -> EngineResult<DocumentDetail> {
        let document = self.fetch(id).await?;
        let documents = self.db.documents();
        let lines = documents.lines(id).await?;
        let allocations = documents.allocations(id).await?;
        Ok(DocumentDetail {
            document,
            lines,
            allocations,
        })
    }

    async fn fetch(&self, id: &str) -> EngineResult<Document> {
        self.db
            .documents()
            .get(id)
            .await?
            .ok_or_else(|| EngineError::not_found("Document", id))
    }

    // =========================================================================
    // Resolution
    // =========================================================================

    async fn resolve(
        &self,
        policy: &DocumentPolicy,
        payload: &DocumentPayload,
    ) -> EngineResult<Resolved> {
        let company = self
            .db
            .companies()
            .get_by_id(&payload.company_id)
            .await?
            .ok_or_else(|| EngineError::not_found("Company", &payload.company_id))?;
        let branch = self
            .db
            .branches()
            .get(&payload.branch_id, &company.id)
            .await?
            .ok_or_else(|| EngineError::not_found("Branch", &payload.branch_id))?;
        let party = self
            .db
            .parties()
            .get(&payload.party_id, &company.id)
            .await?
            .ok_or_else(|| EngineError::not_found("Party", &payload.party_id))?;

        if let Some(kind) = policy.party_kind {
            if party.kind != kind {
                return Err(ValidationError::mismatch(
                    "party_id",
                    format!("{} needs a {kind}, {} is a {}", policy.document_type, party.id, party.kind),
                )
                .into());
            }
        }

        let items = self
            .resolve_items(&company.id, payload.lines.iter().map(|l| l.item_id.as_str()))
            .await?;

        let source = match &payload.source_id {
            Some(source_id) => Some(self.resolve_source(policy, &company, &party, source_id).await?),
            None => None,
        };

        let mut allocations = Vec::with_capacity(payload.allocations.len());
        for allocation in &payload.allocations {
            let target = self.fetch(&allocation.document_id).await?;
            if target.company_id != company.id {
                return Err(EngineError::not_found("Document", &allocation.document_id));
            }
            let expected = DocumentPolicy::settles(party.kind);
            if target.party_id != party.id || target.document_type != expected {
                return Err(ValidationError::mismatch(
                    "allocations",
                    format!("{} is not a {expected} of {}", target.document_number, party.id),
                )
                .into());
            }
            let amount = Money::from_cents(allocation.amount_cents);
            if amount > target.balance() {
                return Err(ValidationError::mismatch(
                    "allocations",
                    format!(
                        "{amount} exceeds the balance {} of {}",
                        target.balance(),
                        target.document_number
                    ),
                )
                .into());
            }
            allocations.push((target, amount));
        }

        Ok(Resolved {
            company,
            branch,
            party,
            items,
            source,
            allocations,
        })
    }

    async fn resolve_source(
        &self,
        policy: &DocumentPolicy,
        company: &Company,
        party: &Party,
        source_id: &str,
    ) -> EngineResult<SourceContext> {
        let source = self.fetch(source_id).await?;
        if source.company_id != company.id {
            return Err(EngineError::not_found("Document", source_id));
        }
        if source.party_id != party.id {
            return Err(ValidationError::mismatch(
                "source_id",
                format!("{} belongs to another party", source.document_number),
            )
            .into());
        }

        let acceptable = match policy.parent {
            Some(parent) => source.document_type == parent,
            None => policy.accepts_source(source.document_type, source.status),
        };
        if !acceptable {
            return Err(ValidationError::mismatch(
                "source_id",
                format!(
                    "{} cannot be raised from {} {} ({})",
                    policy.document_type, source.document_type, source.document_number, source.status
                ),
            )
            .into());
        }
        if policy.parent.is_none() {
            self.ensure_not_raised(policy.document_type, &source).await?;
        }

        let lines = self.db.documents().lines(&source.id).await?;
        Ok(SourceContext {
            document: source,
            lines,
        })
    }

    /// A source backs at most one document of each type. Sources without a
    /// consumed status (a GRN) rely on this alone.
    async fn ensure_not_raised(
        &self,
        document_type: DocumentType,
        source: &Document,
    ) -> EngineResult<()> {
        let raised: Vec<String> = self
            .db
            .documents()
            .find_by_source(&source.id)
            .await?
            .into_iter()
            .filter(|d| d.document_type == document_type)
            .map(|d| d.document_number)
            .collect();
        if raised.is_empty() {
            return Ok(());
        }
        Err(ValidationError::mismatch(
            "source_id",
            format!("{} is already used by {}", source.document_number, raised.join(", ")),
        )
        .into())
    }

    async fn resolve_items<'a>(
        &self,
        company_id: &str,
        ids: impl Iterator<Item = &'a str>,
    ) -> EngineResult<HashMap<String, Item>> {
        let mut items = HashMap::new();
        for id in ids {
            if items.contains_key(id) {
                continue;
            }
            let item = self
                .db
                .items()
                .get(id, company_id)
                .await?
                .ok_or_else(|| EngineError::not_found("Item", id))?;
            items.insert(item.id.clone(), item);
        }
        Ok(items)
    }

    async fn tracked_for(
        &self,
        company_id: &str,
        lines: &[DocumentLine],
    ) -> EngineResult<HashSet<String>> {
        let items = self
            .resolve_items(company_id, lines.iter().map(|l| l.item_id.as_str()))
            .await?;
        Ok(tracked_items(items.values()))
    }

    async fn load_source(&self, document: &Document) -> EngineResult<Option<SourceContext>> {
        let Some(source_id) = &document.source_id else {
            return Ok(None);
        };
        let source = self.fetch(source_id).await?;
        let lines = self.db.documents().lines(source_id).await?;
        Ok(Some(SourceContext {
            document: source,
            lines,
        }))
    }

    async fn ensure_unreferenced(&self, document: &Document) -> EngineResult<()> {
        let dependants = self.db.documents().find_by_source(&document.id).await?;
        if dependants.is_empty() {
            return Ok(());
        }
        let numbers: Vec<&str> = dependants.iter().map(|d| d.document_number.as_str()).collect();
        Err(EngineError::DocumentLocked {
            id: document.id.clone(),
            reason: format!("referenced by {}", numbers.join(", ")),
        })
    }

    // =========================================================================
    // Journaled Writes
    // =========================================================================

    fn compensator(&self) -> Compensator<'_> {
        Compensator {
            db: &self.db,
            inventory: &self.inventory,
            balances: &self.balances,
        }
    }

    async fn apply_stock(&self, journal: &mut Journal, change: StockChange) -> EngineResult<()> {
        self.inventory.apply(&change).await?;
        journal.record(Undo::Stock(change.reversed()));
        Ok(())
    }

    /// Applies the reverse of a change made earlier.
    async fn withdraw_stock(&self, journal: &mut Journal, change: &StockChange) -> EngineResult<()> {
        self.inventory.apply(&change.reversed()).await?;
        journal.record(Undo::Stock(change.clone()));
        Ok(())
    }

    async fn move_status(
        &self,
        journal: &mut Journal,
        document: &Document,
        to: DocumentStatus,
    ) -> EngineResult<()> {
        let moved = self
            .db
            .documents()
            .set_status(&document.id, document.status, to)
            .await?;
        if !moved {
            return Err(EngineError::DocumentLocked {
                id: document.id.clone(),
                reason: format!("{} is no longer {}", document.document_number, document.status),
            });
        }
        journal.record(Undo::Status {
            document_id: document.id.clone(),
            current: to,
            restore: document.status,
        });
        Ok(())
    }

    async fn apply_payment(
        &self,
        journal: &mut Journal,
        document_id: &str,
        delta: Money,
    ) -> EngineResult<()> {
        self.balances.apply_to_document(document_id, delta).await?;
        journal.record(Undo::Payment {
            document_id: document_id.to_string(),
            delta: -delta,
        });
        Ok(())
    }

    async fn adjust_advance(
        &self,
        journal: &mut Journal,
        party_id: &str,
        delta: Money,
    ) -> EngineResult<()> {
        self.balances.adjust_advance(party_id, delta).await?;
        journal.record(Undo::Advance {
            party_id: party_id.to_string(),
            delta: -delta,
        });
        Ok(())
    }

    async fn post(
        &self,
        journal: &mut Journal,
        document: &Document,
        side: EntrySide,
        amount: Money,
        description: String,
    ) -> EngineResult<()> {
        let reference_type = document.document_type.as_str();
        self.balances
            .post_entry(
                &document.party_id,
                amount,
                side,
                reference_type,
                &document.id,
                Some(description),
            )
            .await?;
        journal.record(Undo::Post {
            party_id: document.party_id.clone(),
            amount,
            side: side.opposite(),
            reference_type: reference_type.to_string(),
            reference_id: document.id.clone(),
        });
        Ok(())
    }

    async fn post_total(
        &self,
        journal: &mut Journal,
        document: &Document,
        side: EntrySide,
    ) -> EngineResult<()> {
        let total = document.total();
        if !total.is_positive() {
            return Ok(());
        }
        let description = format!("{} {}", document.document_type, document.document_number);
        self.post(journal, document, side, total, description).await
    }

    async fn reverse_ledger(&self, journal: &mut Journal, document: &Document) -> EngineResult<()> {
        let reference_type = document.document_type.as_str();
        let reversals = self
            .balances
            .reverse_entries_for_reference(reference_type, &document.id)
            .await?;
        for entry in reversals {
            let side = EntrySide::for_delta(entry.delta());
            journal.record(Undo::Post {
                party_id: entry.party_id.clone(),
                amount: entry.delta().abs(),
                side: side.opposite(),
                reference_type: reference_type.to_string(),
                reference_id: document.id.clone(),
            });
        }
        Ok(())
    }
}

/// Old and new state of a line edit.
struct ContentEdit<'a> {
    before: &'a Document,
    after: &'a Document,
    old_lines: Vec<DocumentLine>,
    new_lines: &'a [DocumentLine],
    old_plan: Vec<StockChange>,
    new_plan: Vec<StockChange>,
    side: Option<EntrySide>,
}

fn tracked_items<'a>(items: impl Iterator<Item = &'a Item>) -> HashSet<String> {
    items
        .filter(|i| i.tracks_inventory)
        .map(|i| i.id.clone())
        .collect()
}

fn apply_totals(document: &mut Document, totals: &DocumentTotals, discount: DocumentDiscount) {
    document.subtotal_cents = totals.subtotal.cents();
    document.cgst_cents = totals.cgst.cents();
    document.sgst_cents = totals.sgst.cents();
    document.igst_cents = totals.igst.cents();
    document.tax_cents = totals.tax.cents();
    document.discount_bps = i64::from(discount.bps());
    document.discount_cents = totals.discount.cents();
    document.total_cents = totals.total.cents();
    document.balance_cents = totals.total.cents() - document.paid_cents;
    document.payment_status = if document.policy().tracks_payment {
        PaymentStatus::derive(totals.total, document.paid())
    } else {
        PaymentStatus::NotApplicable
    };
}

/// The discount a stored header was priced with.
fn stored_discount(document: &Document) -> DocumentDiscount {
    if document.discount_bps > 0 {
        DocumentDiscount::Percentage(u32::try_from(document.discount_bps).unwrap_or_default())
    } else if document.discount_cents > 0 {
        DocumentDiscount::Flat(Money::from_cents(document.discount_cents))
    } else {
        DocumentDiscount::None
    }
}
