use crate::database::{Migration, Migrations};
use crate::store::types::{now, timestamp};
use crate::store::{StoreError, StoreResult};
use sqlx::{Connection, SqliteConnection};
use tracing::*;

pub(crate) const MIGRATIONS: Migrations = Migrations::new(
	"Catalog",
	&[Migration::new("Create products tree")
		.up(r#"
			CREATE TABLE IF NOT EXISTS products (
				id INTEGER PRIMARY KEY AUTOINCREMENT,
				parent_id INTEGER REFERENCES products(id) ON DELETE CASCADE,
				title TEXT NOT NULL,
				description TEXT NOT NULL DEFAULT '',
				price INTEGER NOT NULL DEFAULT 0,
				available INTEGER NOT NULL DEFAULT 1,
				is_category INTEGER NOT NULL DEFAULT 0,
				request_only INTEGER NOT NULL DEFAULT 0,
				account_enabled INTEGER NOT NULL DEFAULT 0,
				self_available INTEGER NOT NULL DEFAULT 0,
				self_price INTEGER NOT NULL DEFAULT 0,
				pre_available INTEGER NOT NULL DEFAULT 0,
				pre_price INTEGER NOT NULL DEFAULT 0,
				require_username INTEGER NOT NULL DEFAULT 0,
				require_password INTEGER NOT NULL DEFAULT 0,
				allow_first_plan INTEGER NOT NULL DEFAULT 0,
				cashback_enabled INTEGER NOT NULL DEFAULT 0,
				cashback_percent INTEGER NOT NULL DEFAULT 0,
				sort_order INTEGER NOT NULL DEFAULT 0,
				created_at TEXT NOT NULL,
				updated_at TEXT NOT NULL
			);
			CREATE INDEX IF NOT EXISTS products_parent ON products(parent_id, sort_order);
		"#)
		.down("DROP TABLE products;")],
);

#[derive(Clone, Debug, sqlx::FromRow, serde::Serialize)]
pub struct Product {
	pub id: i64,
	pub parent_id: Option<i64>,
	pub title: String,
	pub description: String,
	pub price: i64,
	pub available: bool,
	pub is_category: bool,
	pub request_only: bool,
	pub account_enabled: bool,
	pub self_available: bool,
	pub self_price: i64,
	pub pre_available: bool,
	pub pre_price: i64,
	pub require_username: bool,
	pub require_password: bool,
	pub allow_first_plan: bool,
	pub cashback_enabled: bool,
	pub cashback_percent: i64,
	pub sort_order: i64,
	pub created_at: String,
	pub updated_at: String,
}

/// How an account product is delivered: on the customer's own account or as a prebuilt one.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AccountMode {
	OwnAccount,
	Prebuilt,
}

impl AccountMode {
	pub fn as_str(self) -> &'static str {
		match self {
			AccountMode::OwnAccount => "self",
			AccountMode::Prebuilt => "pre",
		}
	}

	pub fn parse(value: &str) -> Option<Self> {
		match value {
			"self" => Some(AccountMode::OwnAccount),
			"pre" => Some(AccountMode::Prebuilt),
			_ => None,
		}
	}

	pub fn label(self) -> &'static str {
		match self {
			AccountMode::OwnAccount => "On my own account",
			AccountMode::Prebuilt => "Prebuilt account",
		}
	}
}

impl Product {
	/// Price of buying this product in the given account mode, `None` when that way is closed.
	pub fn price_for(&self, mode: Option<AccountMode>) -> Option<i64> {
		match (self.account_enabled, mode) {
			(false, None) => Some(self.price),
			(true, Some(AccountMode::OwnAccount)) if self.self_available => Some(self.self_price),
			(true, Some(AccountMode::Prebuilt)) if self.pre_available => Some(self.pre_price),
			_ => None,
		}
	}

	pub fn account_modes(&self) -> Vec<AccountMode> {
		let mut modes = Vec::new();
		if self.account_enabled && self.self_available {
			modes.push(AccountMode::OwnAccount);
		}
		if self.account_enabled && self.pre_available {
			modes.push(AccountMode::Prebuilt);
		}
		modes
	}

	pub fn effective_cashback_percent(&self) -> i64 {
		if self.cashback_enabled {
			self.cashback_percent.clamp(0, 100)
		} else {
			0
		}
	}
}

#[derive(Clone, Debug, Default)]
pub struct NewProduct {
	pub parent_id: Option<i64>,
	pub title: String,
	pub description: String,
	pub price: i64,
	pub available: bool,
	pub is_category: bool,
	pub request_only: bool,
	pub account_enabled: bool,
	pub self_available: bool,
	pub self_price: i64,
	pub pre_available: bool,
	pub pre_price: i64,
	pub require_username: bool,
	pub require_password: bool,
	pub allow_first_plan: bool,
	pub cashback_enabled: bool,
	pub cashback_percent: i64,
	pub sort_order: i64,
}

impl NewProduct {
	pub fn category(title: impl Into<String>, sort_order: i64) -> Self {
		Self {
			title: title.into(),
			is_category: true,
			available: true,
			sort_order,
			..Self::default()
		}
	}

	pub fn item(parent_id: Option<i64>, title: impl Into<String>, price: i64) -> Self {
		Self {
			parent_id,
			title: title.into(),
			price,
			available: true,
			..Self::default()
		}
	}
}

/// Partial product edit, `None` fields are left alone.
#[derive(Clone, Debug, Default)]
pub struct ProductUpdate {
	/// `Some(None)` moves the product to the root.
	pub parent_id: Option<Option<i64>>,
	pub title: Option<String>,
	pub description: Option<String>,
	pub price: Option<i64>,
	pub available: Option<bool>,
	pub request_only: Option<bool>,
	pub account_enabled: Option<bool>,
	pub self_available: Option<bool>,
	pub self_price: Option<i64>,
	pub pre_available: Option<bool>,
	pub pre_price: Option<i64>,
	pub require_username: Option<bool>,
	pub require_password: Option<bool>,
	pub allow_first_plan: Option<bool>,
	pub cashback_enabled: Option<bool>,
	pub cashback_percent: Option<i64>,
	pub sort_order: Option<i64>,
}

impl ProductUpdate {
	fn apply(self, product: &mut Product) {
		if let Some(parent_id) = self.parent_id {
			product.parent_id = parent_id;
		}
		if let Some(title) = self.title {
			product.title = title;
		}
		if let Some(description) = self.description {
			product.description = description;
		}
		macro_rules! set {
			($($field:ident),*) => {$(
				if let Some(value) = self.$field {
					product.$field = value;
				}
			)*};
		}
		set!(
			price,
			available,
			request_only,
			account_enabled,
			self_available,
			self_price,
			pre_available,
			pre_price,
			require_username,
			require_password,
			allow_first_plan,
			cashback_enabled,
			cashback_percent,
			sort_order
		);
	}
}

/// Brings a product into a consistent shape before it is stored.
fn normalize(product: &mut Product) -> StoreResult<()> {
	product.title = product.title.trim().to_owned();
	product.description = product.description.trim().to_owned();
	if product.title.is_empty() {
		return Err(StoreError::InvalidInput("title cannot be empty".to_owned()));
	}
	product.price = product.price.max(0);
	product.self_price = product.self_price.max(0);
	product.pre_price = product.pre_price.max(0);
	product.cashback_percent = product.cashback_percent.clamp(0, 100);
	if product.is_category || product.request_only {
		product.price = 0;
		product.available = true;
		product.account_enabled = false;
		product.self_available = false;
		product.pre_available = false;
		product.self_price = 0;
		product.pre_price = 0;
	}
	if product.is_category {
		product.request_only = false;
		product.require_username = false;
		product.require_password = false;
		product.allow_first_plan = false;
		product.cashback_enabled = false;
		product.cashback_percent = 0;
	}
	Ok(())
}

pub async fn get_product(conn: &mut SqliteConnection, id: i64) -> StoreResult<Option<Product>> {
	let product = sqlx::query_as::<_, Product>("SELECT * FROM products WHERE id = ?")
		.bind(id)
		.fetch_optional(&mut *conn)
		.await?;
	Ok(product)
}

pub async fn list_products(
	conn: &mut SqliteConnection,
	parent_id: Option<i64>,
) -> StoreResult<Vec<Product>> {
	let products = sqlx::query_as::<_, Product>(
		"SELECT * FROM products WHERE parent_id IS ? ORDER BY sort_order, title COLLATE NOCASE, id",
	)
	.bind(parent_id)
	.fetch_all(&mut *conn)
	.await?;
	Ok(products)
}

/// Sort positions must be unique among siblings of the same kind, `0` means unsorted.
pub async fn has_sort_conflict(
	conn: &mut SqliteConnection,
	parent_id: Option<i64>,
	is_category: bool,
	sort_order: i64,
	exclude_id: Option<i64>,
) -> StoreResult<bool> {
	if sort_order == 0 {
		return Ok(false);
	}
	let found = sqlx::query_scalar::<_, i64>(
		r#"
		SELECT id FROM products
		WHERE parent_id IS ? AND is_category = ? AND sort_order = ? AND id != COALESCE(?, -1)
		LIMIT 1
		"#,
	)
	.bind(parent_id)
	.bind(is_category)
	.bind(sort_order)
	.bind(exclude_id)
	.fetch_optional(&mut *conn)
	.await?;
	Ok(found.is_some())
}

async fn check_parent(
	conn: &mut SqliteConnection,
	parent_id: Option<i64>,
	moving: Option<i64>,
) -> StoreResult<()> {
	let mut cursor = parent_id;
	let mut first = true;
	// Walk up to the root, refusing non categories and cycles through the moved product
	while let Some(id) = cursor {
		if Some(id) == moving {
			return Err(StoreError::InvalidParent(id));
		}
		let parent = get_product(conn, id)
			.await?
			.ok_or(StoreError::InvalidParent(id))?;
		if first && !parent.is_category {
			return Err(StoreError::InvalidParent(id));
		}
		first = false;
		cursor = parent.parent_id;
	}
	Ok(())
}

pub async fn create_product(conn: &mut SqliteConnection, new: NewProduct) -> StoreResult<i64> {
	let ts = timestamp(now());
	let mut product = Product {
		id: 0,
		parent_id: new.parent_id,
		title: new.title,
		description: new.description,
		price: new.price,
		available: new.available,
		is_category: new.is_category,
		request_only: new.request_only,
		account_enabled: new.account_enabled,
		self_available: new.self_available,
		self_price: new.self_price,
		pre_available: new.pre_available,
		pre_price: new.pre_price,
		require_username: new.require_username,
		require_password: new.require_password,
		allow_first_plan: new.allow_first_plan,
		cashback_enabled: new.cashback_enabled,
		cashback_percent: new.cashback_percent,
		sort_order: new.sort_order,
		created_at: ts.clone(),
		updated_at: ts,
	};
	normalize(&mut product)?;
	check_parent(conn, product.parent_id, None).await?;
	if has_sort_conflict(
		conn,
		product.parent_id,
		product.is_category,
		product.sort_order,
		None,
	)
	.await?
	{
		return Err(StoreError::SortConflict(product.sort_order));
	}
	let id = sqlx::query(
		r#"
		INSERT INTO products (
			parent_id, title, description, price, available, is_category, request_only,
			account_enabled, self_available, self_price, pre_available, pre_price,
			require_username, require_password, allow_first_plan, cashback_enabled,
			cashback_percent, sort_order, created_at, updated_at
		) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
		"#,
	)
	.bind(product.parent_id)
	.bind(&product.title)
	.bind(&product.description)
	.bind(product.price)
	.bind(product.available)
	.bind(product.is_category)
	.bind(product.request_only)
	.bind(product.account_enabled)
	.bind(product.self_available)
	.bind(product.self_price)
	.bind(product.pre_available)
	.bind(product.pre_price)
	.bind(product.require_username)
	.bind(product.require_password)
	.bind(product.allow_first_plan)
	.bind(product.cashback_enabled)
	.bind(product.cashback_percent)
	.bind(product.sort_order)
	.bind(&product.created_at)
	.bind(&product.updated_at)
	.execute(&mut *conn)
	.await?
	.last_insert_rowid();
	info!("Created {} {} `{}`", kind_name(&product), id, product.title);
	Ok(id)
}

fn kind_name(product: &Product) -> &'static str {
	if product.is_category {
		"category"
	} else {
		"product"
	}
}

pub async fn update_product(
	conn: &mut SqliteConnection,
	id: i64,
	update: ProductUpdate,
) -> StoreResult<Product> {
	let mut product = get_product(conn, id)
		.await?
		.ok_or(StoreError::ProductNotFound(id))?;
	update.apply(&mut product);
	normalize(&mut product)?;
	check_parent(conn, product.parent_id, Some(id)).await?;
	if has_sort_conflict(
		conn,
		product.parent_id,
		product.is_category,
		product.sort_order,
		Some(id),
	)
	.await?
	{
		return Err(StoreError::SortConflict(product.sort_order));
	}
	product.updated_at = timestamp(now());
	sqlx::query(
		r#"
		UPDATE products SET
			parent_id = ?, title = ?, description = ?, price = ?, available = ?, request_only = ?,
			account_enabled = ?, self_available = ?, self_price = ?, pre_available = ?, pre_price = ?,
			require_username = ?, require_password = ?, allow_first_plan = ?, cashback_enabled = ?,
			cashback_percent = ?, sort_order = ?, updated_at = ?
		WHERE id = ?
		"#,
	)
	.bind(product.parent_id)
	.bind(&product.title)
	.bind(&product.description)
	.bind(product.price)
	.bind(product.available)
	.bind(product.request_only)
	.bind(product.account_enabled)
	.bind(product.self_available)
	.bind(product.self_price)
	.bind(product.pre_available)
	.bind(product.pre_price)
	.bind(product.require_username)
	.bind(product.require_password)
	.bind(product.allow_first_plan)
	.bind(product.cashback_enabled)
	.bind(product.cashback_percent)
	.bind(product.sort_order)
	.bind(&product.updated_at)
	.bind(id)
	.execute(&mut *conn)
	.await?;
	Ok(product)
}

/// Applies every edit or none of them.
pub async fn bulk_update(
	conn: &mut SqliteConnection,
	updates: Vec<(i64, ProductUpdate)>,
) -> StoreResult<usize> {
	let mut tx = conn.begin().await?;
	let count = updates.len();
	for (id, update) in updates {
		update_product(&mut tx, id, update).await?;
	}
	tx.commit().await?;
	Ok(count)
}

/// Deletes a product, categories take their whole subtree with them.
pub async fn delete_product(conn: &mut SqliteConnection, id: i64) -> StoreResult<()> {
	let done = sqlx::query("DELETE FROM products WHERE id = ?")
		.bind(id)
		.execute(&mut *conn)
		.await?;
	if done.rows_affected() == 0 {
		return Err(StoreError::ProductNotFound(id));
	}
	info!("Deleted product {}", id);
	Ok(())
}

#[derive(Clone, Debug, serde::Serialize)]
pub struct TreeEntry {
	pub product: Product,
	pub depth: usize,
	pub path_display: String,
}

/// The whole catalog held in memory, it is small and is walked a lot when browsing.
pub struct Catalog {
	products: Vec<Product>,
}

impl Catalog {
	pub async fn load(conn: &mut SqliteConnection) -> StoreResult<Self> {
		let products = sqlx::query_as::<_, Product>(
			"SELECT * FROM products ORDER BY sort_order, title COLLATE NOCASE, id",
		)
		.fetch_all(&mut *conn)
		.await?;
		Ok(Self { products })
	}

	pub fn is_empty(&self) -> bool {
		self.products.is_empty()
	}

	pub fn get(&self, id: i64) -> Option<&Product> {
		self.products.iter().find(|p| p.id == id)
	}

	pub fn children(&self, parent_id: Option<i64>) -> impl Iterator<Item = &Product> {
		self.products
			.iter()
			.filter(move |p| p.parent_id == parent_id)
	}

	/// Categories are shown while they have something visible inside them.
	pub fn is_visible(&self, product: &Product) -> bool {
		self.is_visible_within(product, self.products.len())
	}

	fn is_visible_within(&self, product: &Product, budget: usize) -> bool {
		if budget == 0 {
			return false;
		}
		if product.is_category {
			self.children(Some(product.id))
				.any(|child| self.is_visible_within(child, budget - 1))
		} else if product.request_only {
			true
		} else if product.account_enabled {
			product.self_available || product.pre_available
		} else {
			product.available
		}
	}

	pub fn public_children(&self, parent_id: Option<i64>) -> Vec<&Product> {
		self.children(parent_id)
			.filter(|p| self.is_visible(p))
			.collect()
	}

	/// A product that may be shown to customers, including all of its ancestors.
	pub fn find_public(&self, id: i64) -> Option<&Product> {
		let product = self.get(id)?;
		let mut cursor = Some(product);
		let mut budget = self.products.len();
		while let Some(current) = cursor {
			if !self.is_visible(current) || budget == 0 {
				return None;
			}
			budget -= 1;
			cursor = current.parent_id.and_then(|parent| self.get(parent));
		}
		Some(product)
	}

	/// Titles from the root down to the product.
	pub fn path(&self, id: i64) -> Vec<&str> {
		let mut titles = Vec::new();
		let mut cursor = self.get(id);
		while let Some(product) = cursor {
			if titles.len() > self.products.len() {
				break;
			}
			titles.push(product.title.as_str());
			cursor = product.parent_id.and_then(|parent| self.get(parent));
		}
		titles.reverse();
		titles
	}

	/// Depth first listing for the admin panel, categories before items at every level.
	pub fn admin_tree(&self) -> Vec<TreeEntry> {
		let mut out = Vec::with_capacity(self.products.len());
		self.walk(None, 0, &mut Vec::new(), &mut out);
		out
	}

	fn walk<'a>(
		&'a self,
		parent_id: Option<i64>,
		depth: usize,
		trail: &mut Vec<&'a str>,
		out: &mut Vec<TreeEntry>,
	) {
		if depth > self.products.len() {
			return;
		}
		let mut children: Vec<&Product> = self.children(parent_id).collect();
		children.sort_by_key(|p| !p.is_category);
		for child in children {
			trail.push(&child.title);
			out.push(TreeEntry {
				product: child.clone(),
				depth,
				path_display: trail.join(" / "),
			});
			if child.is_category {
				self.walk(Some(child.id), depth + 1, trail, out);
			}
			trail.pop();
		}
	}
}

/// Populates an empty catalog with hidden starter entries for the admin to price and enable.
pub async fn seed_default_catalog(conn: &mut SqliteConnection) -> StoreResult<bool> {
	let existing = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM products")
		.fetch_one(&mut *conn)
		.await?;
	if existing > 0 {
		return Ok(false);
	}
	let groups: [(&str, &[&str]); 2] = [
		(
			"Telegram Premium",
			&["Premium 3 months", "Premium 6 months", "Premium 12 months"],
		),
		(
			"AI accounts",
			&["ChatGPT Plus", "ChatGPT Team", "Google AI Pro"],
		),
	];
	let mut tx = conn.begin().await?;
	for (position, (group, items)) in groups.iter().enumerate() {
		let category =
			create_product(&mut tx, NewProduct::category(*group, position as i64 + 1)).await?;
		for (item_position, item) in items.iter().enumerate() {
			create_product(
				&mut tx,
				NewProduct {
					available: false,
					sort_order: item_position as i64 + 1,
					..NewProduct::item(Some(category), *item, 0)
				},
			)
			.await?;
		}
	}
	tx.commit().await?;
	info!("Seeded the default catalog");
	Ok(true)
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::database::memory_pool;

	#[tokio::test]
	async fn categories_hide_when_nothing_inside_is_visible() {
		let pool = memory_pool().await.unwrap();
		let mut conn = pool.acquire().await.unwrap();
		let games = create_product(&mut conn, NewProduct::category("Games", 1))
			.await
			.unwrap();
		let music = create_product(&mut conn, NewProduct::category("Music", 2))
			.await
			.unwrap();
		create_product(
			&mut conn,
			NewProduct {
				available: false,
				..NewProduct::item(Some(music), "Hidden album", 100)
			},
		)
		.await
		.unwrap();
		let game = create_product(&mut conn, NewProduct::item(Some(games), "Chess", 500))
			.await
			.unwrap();
		let custom = create_product(
			&mut conn,
			NewProduct {
				request_only: true,
				available: false,
				..NewProduct::item(None, "Custom order", 900)
			},
		)
		.await
		.unwrap();

		let catalog = Catalog::load(&mut conn).await.unwrap();
		let root: Vec<i64> = catalog.public_children(None).iter().map(|p| p.id).collect();
		assert_eq!(root, vec![custom, games]);
		assert!(catalog.find_public(game).is_some());
		assert!(catalog.find_public(music).is_none());
		let request = catalog.get(custom).unwrap();
		assert_eq!(request.price, 0, "request only products carry no price");
		assert_eq!(catalog.path(game), vec!["Games", "Chess"]);
	}

	#[tokio::test]
	async fn account_products_follow_their_modes() {
		let pool = memory_pool().await.unwrap();
		let mut conn = pool.acquire().await.unwrap();
		let id = create_product(
			&mut conn,
			NewProduct {
				account_enabled: true,
				self_available: false,
				pre_available: true,
				pre_price: 1200,
				..NewProduct::item(None, "Plus", 1000)
			},
		)
		.await
		.unwrap();
		let catalog = Catalog::load(&mut conn).await.unwrap();
		let product = catalog.get(id).unwrap();
		assert!(catalog.is_visible(product));
		assert_eq!(product.account_modes(), vec![AccountMode::Prebuilt]);
		assert_eq!(product.price_for(Some(AccountMode::Prebuilt)), Some(1200));
		assert_eq!(product.price_for(Some(AccountMode::OwnAccount)), None);
		assert_eq!(product.price_for(None), None);
	}

	#[tokio::test]
	async fn sort_positions_are_unique_per_sibling_kind() {
		let pool = memory_pool().await.unwrap();
		let mut conn = pool.acquire().await.unwrap();
		let cat = create_product(&mut conn, NewProduct::category("A", 1))
			.await
			.unwrap();
		let err = create_product(&mut conn, NewProduct::category("B", 1))
			.await
			.unwrap_err();
		assert!(matches!(err, StoreError::SortConflict(1)));
		// Items and categories are ordered separately
		create_product(
			&mut conn,
			NewProduct {
				sort_order: 1,
				..NewProduct::item(None, "Item", 10)
			},
		)
		.await
		.unwrap();
		// Unsorted entries never conflict
		create_product(&mut conn, NewProduct::item(Some(cat), "x", 1))
			.await
			.unwrap();
		create_product(&mut conn, NewProduct::item(Some(cat), "y", 1))
			.await
			.unwrap();
	}

	#[tokio::test]
	async fn parents_must_be_categories_without_cycles() {
		let pool = memory_pool().await.unwrap();
		let mut conn = pool.acquire().await.unwrap();
		let outer = create_product(&mut conn, NewProduct::category("Outer", 1))
			.await
			.unwrap();
		let inner = create_product(
			&mut conn,
			NewProduct {
				parent_id: Some(outer),
				..NewProduct::category("Inner", 1)
			},
		)
		.await
		.unwrap();
		let item = create_product(&mut conn, NewProduct::item(Some(inner), "Thing", 5))
			.await
			.unwrap();

		let err = create_product(&mut conn, NewProduct::item(Some(item), "Under item", 5))
			.await
			.unwrap_err();
		assert!(matches!(err, StoreError::InvalidParent(id) if id == item));

		let err = update_product(
			&mut conn,
			outer,
			ProductUpdate {
				parent_id: Some(Some(inner)),
				..ProductUpdate::default()
			},
		)
		.await
		.unwrap_err();
		assert!(matches!(err, StoreError::InvalidParent(_)));

		let tree = Catalog::load(&mut conn).await.unwrap().admin_tree();
		let paths: Vec<&str> = tree.iter().map(|e| e.path_display.as_str()).collect();
		assert_eq!(paths, vec!["Outer", "Outer / Inner", "Outer / Inner / Thing"]);
		assert_eq!(tree[2].depth, 2);

		delete_product(&mut conn, outer).await.unwrap();
		assert!(get_product(&mut conn, item).await.unwrap().is_none());
	}

	#[tokio::test]
	async fn bulk_update_is_all_or_nothing() {
		let pool = memory_pool().await.unwrap();
		let mut conn = pool.acquire().await.unwrap();
		let a = create_product(&mut conn, NewProduct::item(None, "A", 10))
			.await
			.unwrap();
		let result = bulk_update(
			&mut conn,
			vec![
				(
					a,
					ProductUpdate {
						price: Some(99),
						..ProductUpdate::default()
					},
				),
				(
					a + 100,
					ProductUpdate {
						price: Some(1),
						..ProductUpdate::default()
					},
				),
			],
		)
		.await;
		assert!(matches!(result, Err(StoreError::ProductNotFound(_))));
		assert_eq!(get_product(&mut conn, a).await.unwrap().unwrap().price, 10);
	}

	#[tokio::test]
	async fn seeding_only_fills_an_empty_catalog() {
		let pool = memory_pool().await.unwrap();
		let mut conn = pool.acquire().await.unwrap();
		assert!(seed_default_catalog(&mut conn).await.unwrap());
		assert!(!seed_default_catalog(&mut conn).await.unwrap());
		let catalog = Catalog::load(&mut conn).await.unwrap();
		assert_eq!(catalog.admin_tree().len(), 8);
		assert!(catalog.public_children(None).is_empty());
	}
}
