//! Throw-away repositories shared by the integration tests.

#![allow(dead_code)]

use std::fs;
use std::path::Path;

use archlens::application::{AnalysisConfig, AnalysisRun, RunReport};
use tempfile::TempDir;

pub const ORDERS_APP: &str = "\
from flask import Flask
from flask_login import login_required

app = Flask(__name__)

@app.get('/orders')
@login_required
def list_orders():
    return []

@app.post('/orders')
@login_required
def create_order():
    return {}
";

pub const ORDERS_MODELS: &str = "\
from flask_sqlalchemy import SQLAlchemy

db = SQLAlchemy()

class Order(db.Model):
    id = db.Column(db.Integer, primary_key=True)
    total = db.Column(db.Numeric)
";

pub const ORDERS_SERVICES: &str = "\
class OrderService:
    def place(self, order):
        return order
";

pub fn write(root: &Path, relative: &str, contents: impl AsRef<[u8]>) {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, contents).unwrap();
}

/// Three-file Flask application: two protected endpoints, one model, one service.
pub fn orders_repo() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "app.py", ORDERS_APP);
    write(dir.path(), "models.py", ORDERS_MODELS);
    write(dir.path(), "services.py", ORDERS_SERVICES);
    dir
}

/// Flask application spread over several packages, for ordering-sensitive checks.
pub fn shop_repo(packages: usize) -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "requirements.txt", "flask==3.0\n");
    for i in 0..packages {
        write(
            dir.path(),
            &format!("shop/pkg{}/routes.py", i),
            format!(
                "\
from flask import Blueprint
bp = Blueprint('pkg{i}', __name__, url_prefix='/api/v1')

@bp.route('/items{i}', methods=['GET', 'POST'])
@roles_required('manager')
def items{i}():
    return []

@bp.route('/items{i}/<int:item_id>', methods=['DELETE'])
def item{i}(item_id):
    return {{}}

@bp.route('/reports{i}')
def reports{i}():
    return render_template('report{i}.html')
"
            ),
        );
        write(
            dir.path(),
            &format!("shop/pkg{}/models.py", i),
            format!(
                "\
class Item{i}(db.Model):
    id = db.Column(db.Integer, primary_key=True)
    owner = db.Column(db.String)

class Report{i}(db.Model):
    item = relationship('Item{i}')
"
            ),
        );
    }
    write(
        dir.path(),
        "shop/billing.py",
        "import stripe\n\nSTRIPE_API = 'https://api.stripe.com/v1'\n\nclass BillingGateway:\n    pass\n",
    );
    dir
}

pub fn config() -> AnalysisConfig {
    AnalysisConfig::default()
}

pub fn run(root: &Path, config: AnalysisConfig) -> RunReport {
    AnalysisRun::new(root, config).unwrap().execute()
}
